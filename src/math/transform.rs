use super::fixed::Fix64;
use super::quaternion::Quaternion;
use super::vector::Vector3;

/// A rigid transform: a position plus a unit-quaternion orientation
/// (spec.md section 3).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RigidTransform {
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl RigidTransform {
    pub const IDENTITY: RigidTransform = RigidTransform {
        position: Vector3::ZERO,
        orientation: Quaternion::IDENTITY,
    };

    pub fn new(position: Vector3, orientation: Quaternion) -> Self {
        RigidTransform { position, orientation }
    }

    /// Maps a point from local space to world space.
    pub fn transform_point(self, local: Vector3) -> Vector3 {
        self.orientation.rotate(local) + self.position
    }

    /// Maps a direction from local space to world space (ignores translation).
    pub fn transform_vector(self, local: Vector3) -> Vector3 {
        self.orientation.rotate(local)
    }

    /// Maps a point from world space back to local space.
    pub fn inverse_transform_point(self, world: Vector3) -> Vector3 {
        self.orientation.conjugate().rotate(world - self.position)
    }

    pub fn inverse(self) -> Self {
        let inv_rot = self.orientation.conjugate();
        RigidTransform::new(inv_rot.rotate(-self.position), inv_rot)
    }

    /// Composes two transforms: `(self * rhs)` applies `rhs` first, then `self`.
    pub fn compose(self, rhs: Self) -> Self {
        RigidTransform::new(
            self.transform_point(rhs.position),
            self.orientation * rhs.orientation,
        )
    }

    pub fn lerp(self, rhs: Self, t: Fix64) -> Self {
        RigidTransform::new(self.position.lerp(rhs.position, t), self.orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_undoes_transform() {
        let t = RigidTransform::new(
            Vector3::new(Fix64::ONE, Fix64::TWO, Fix64::from_i32(3)),
            Quaternion::from_axis_angle(Vector3::Y, Fix64::QUARTER_PI),
        );
        let p = Vector3::new(Fix64::from_i32(5), Fix64::ZERO, Fix64::ONE);
        let world = t.transform_point(p);
        let back = t.inverse_transform_point(world);
        assert!((back.x - p.x).abs().to_f64() < 1e-3);
        assert!((back.y - p.y).abs().to_f64() < 1e-3);
        assert!((back.z - p.z).abs().to_f64() < 1e-3);
    }
}
