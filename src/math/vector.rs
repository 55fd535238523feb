use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

use super::fixed::{DomainError, Fix64};

/// A three-component vector over [`Fix64`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::ZERO);
    pub const X: Vector3 = Vector3::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
    pub const Y: Vector3 = Vector3::new(Fix64::ZERO, Fix64::ONE, Fix64::ZERO);
    pub const Z: Vector3 = Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::ONE);

    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Vector3 { x, y, z }
    }

    #[inline]
    pub fn splat(v: Fix64) -> Self {
        Vector3::new(v, v, v)
    }

    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x.safe_mul(rhs.x).safe_add(self.y.safe_mul(rhs.y)).safe_add(self.z.safe_mul(rhs.z))
    }

    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Vector3::new(
            self.y.safe_mul(rhs.z).safe_sub(self.z.safe_mul(rhs.y)),
            self.z.safe_mul(rhs.x).safe_sub(self.x.safe_mul(rhs.z)),
            self.x.safe_mul(rhs.y).safe_sub(self.y.safe_mul(rhs.x)),
        )
    }

    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    pub fn length(self) -> Result<Fix64, DomainError> {
        self.length_squared().sqrt()
    }

    /// Normalizes the vector, or returns `None` if its length is (numerically)
    /// zero. Mirrors the "safe" naming convention used by the scalar layer:
    /// callers that can prove non-zero length may unwrap directly.
    pub fn normalize(self) -> Option<(Self, Fix64)> {
        let len_sq = self.length_squared();
        if len_sq.is_zero() {
            return None;
        }
        let len = len_sq.sqrt().ok()?;
        if len.is_zero() {
            return None;
        }
        Some((self * Fix64::ONE.safe_div(len), len))
    }

    /// Picks an arbitrary unit vector orthogonal to `self`, assumed non-zero.
    /// Used as the fallback tangent basis when a canonical tangent direction
    /// (e.g. the sliding direction) degenerates to zero.
    pub fn orthonormal_vector(self) -> Vector3 {
        let (basis, _) = self.orthonormal_basis();
        basis
    }

    /// Builds a pair of unit vectors spanning the plane orthogonal to `self`.
    pub fn orthonormal_basis(self) -> (Vector3, Vector3) {
        // 1/sqrt(3), the threshold used by the classic Duff et al. branch-free
        // orthonormal basis construction to decide which axis to pivot on.
        const ONE_OVER_SQRT3: Fix64 = Fix64::from_raw(2_479_700_525);
        let a = if self.x.abs() >= ONE_OVER_SQRT3 {
            Vector3::new(self.y, -self.x, Fix64::ZERO)
        } else {
            Vector3::new(Fix64::ZERO, self.z, -self.y)
        };
        let (t1, _) = a.normalize().unwrap_or((Vector3::X, Fix64::ONE));
        let t2 = self.cross(t1);
        let (t2, _) = t2.normalize().unwrap_or((Vector3::Y, Fix64::ONE));
        (t1, t2)
    }

    #[inline]
    pub fn min(self, rhs: Self) -> Self {
        Vector3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: Self) -> Self {
        Vector3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline]
    pub fn abs(self) -> Self {
        Vector3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    #[inline]
    pub fn lerp(self, rhs: Self, t: Fix64) -> Self {
        self + (rhs - self) * t
    }
}

impl Index<usize> for Vector3 {
    type Output = Fix64;
    fn index(&self, i: usize) -> &Fix64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vector3 index out of bounds: {}", i),
        }
    }
}

impl IndexMut<usize> for Vector3 {
    fn index_mut(&mut self, i: usize) -> &mut Fix64 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Vector3 index out of bounds: {}", i),
        }
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Self) -> Self {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Self) -> Self {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<Fix64> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: Fix64) -> Self {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<Fix64> for Vector3 {
    type Output = Vector3;
    fn div(self, rhs: Fix64) -> Self {
        Vector3::new(self.x.safe_div(rhs), self.y.safe_div(rhs), self.z.safe_div(rhs))
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Self {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vector3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_is_orthogonal() {
        let a = Vector3::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
        let b = Vector3::new(Fix64::ZERO, Fix64::ONE, Fix64::ZERO);
        let c = a.cross(b);
        assert_eq!(c, Vector3::Z);
        assert_eq!(c.dot(a), Fix64::ZERO);
        assert_eq!(c.dot(b), Fix64::ZERO);
    }

    #[test]
    fn normalize_unit_length() {
        let v = Vector3::new(Fix64::from_i32(3), Fix64::from_i32(4), Fix64::ZERO);
        let (n, len) = v.normalize().unwrap();
        assert!((len.to_f64() - 5.0).abs() < 1e-6);
        assert!((n.length_squared().to_f64() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn normalize_zero_is_none() {
        assert!(Vector3::ZERO.normalize().is_none());
    }
}
