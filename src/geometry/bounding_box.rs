use crate::math::{Fix64, RigidTransform, Vector3};

/// An axis-aligned bounding box. Invariant: `min <= max` componentwise
/// (spec.md section 3).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min: Vector3,
    pub max: Vector3,
}

impl BoundingBox {
    /// A box that contains nothing; merging it with any box yields that box.
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Vector3::new(Fix64::MAX, Fix64::MAX, Fix64::MAX),
        max: Vector3::new(Fix64::MIN, Fix64::MIN, Fix64::MIN),
    };

    pub fn new(min: Vector3, max: Vector3) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y && min.z <= max.z);
        BoundingBox { min, max }
    }

    pub fn from_point(p: Vector3) -> Self {
        BoundingBox { min: p, max: p }
    }

    pub fn center(self) -> Vector3 {
        (self.min + self.max) * Fix64::HALF
    }

    pub fn extents(self) -> Vector3 {
        (self.max - self.min) * Fix64::HALF
    }

    /// Expands the box uniformly by `amount` in every direction (used to
    /// apply a collision margin or broad-phase prediction distance).
    pub fn expanded(self, amount: Fix64) -> Self {
        let delta = Vector3::splat(amount);
        BoundingBox::new(self.min - delta, self.max + delta)
    }

    pub fn merge(self, other: Self) -> Self {
        BoundingBox::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn contains(self, other: Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    pub fn contains_point(self, p: Vector3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersects(self, other: Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The surface area, used by the surface-area-heuristic insertion and
    /// revalidation passes in the broad phase (spec.md section 4.3).
    pub fn surface_area(self) -> Fix64 {
        let d = self.max - self.min;
        let two = Fix64::TWO;
        two.safe_mul(d.x.safe_mul(d.y).safe_add(d.y.safe_mul(d.z)).safe_add(d.z.safe_mul(d.x)))
    }

    pub fn volume(self) -> Fix64 {
        let d = self.max - self.min;
        d.x.safe_mul(d.y).safe_mul(d.z)
    }

    /// Transforms the box's eight corners by `transform` and returns the
    /// new axis-aligned bounds (used when a shape's local bounding box must
    /// be expressed in world space).
    pub fn transformed(self, transform: RigidTransform) -> Self {
        let mut result = BoundingBox::EMPTY;
        for i in 0..8u8 {
            let corner = Vector3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let world = transform.transform_point(corner);
            result = result.merge(BoundingBox::from_point(world));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_with_self_is_identity() {
        let b = BoundingBox::new(Vector3::ZERO, Vector3::splat(Fix64::ONE));
        assert_eq!(b.merge(b), b);
    }

    #[test]
    fn intersects_touching_boxes() {
        let a = BoundingBox::new(Vector3::ZERO, Vector3::splat(Fix64::ONE));
        let b = BoundingBox::new(Vector3::splat(Fix64::ONE), Vector3::splat(Fix64::TWO));
        assert!(a.intersects(b));
    }

    #[test]
    fn empty_merge_yields_other() {
        let b = BoundingBox::new(Vector3::ZERO, Vector3::splat(Fix64::ONE));
        assert_eq!(BoundingBox::EMPTY.merge(b), b);
    }
}
