use std::ops::Mul;

use super::fixed::Fix64;
use super::vector::Vector3;

/// A row-major 3x3 matrix over [`Fix64`], used for inertia tensors and
/// orientation matrices kept in sync with their quaternion form (spec.md
/// section 3, `Entity` row).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix3x3 {
    pub m00: Fix64,
    pub m01: Fix64,
    pub m02: Fix64,
    pub m10: Fix64,
    pub m11: Fix64,
    pub m12: Fix64,
    pub m20: Fix64,
    pub m21: Fix64,
    pub m22: Fix64,
}

impl Matrix3x3 {
    pub const IDENTITY: Matrix3x3 = Matrix3x3::new(
        Fix64::ONE,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ONE,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ONE,
    );

    pub const ZERO: Matrix3x3 = Matrix3x3::new(
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
        Fix64::ZERO,
    );

    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub const fn new(
        m00: Fix64,
        m01: Fix64,
        m02: Fix64,
        m10: Fix64,
        m11: Fix64,
        m12: Fix64,
        m20: Fix64,
        m21: Fix64,
        m22: Fix64,
    ) -> Self {
        Matrix3x3 { m00, m01, m02, m10, m11, m12, m20, m21, m22 }
    }

    /// Builds a diagonal matrix, as used for a body's local inertia tensor
    /// expressed in its principal axes.
    pub fn from_diagonal(d: Vector3) -> Self {
        Matrix3x3::new(
            d.x, Fix64::ZERO, Fix64::ZERO,
            Fix64::ZERO, d.y, Fix64::ZERO,
            Fix64::ZERO, Fix64::ZERO, d.z,
        )
    }

    pub fn transpose(self) -> Self {
        Matrix3x3::new(
            self.m00, self.m10, self.m20,
            self.m01, self.m11, self.m21,
            self.m02, self.m12, self.m22,
        )
    }

    pub fn transform_vector(self, v: Vector3) -> Vector3 {
        Vector3::new(
            self.m00.safe_mul(v.x).safe_add(self.m01.safe_mul(v.y)).safe_add(self.m02.safe_mul(v.z)),
            self.m10.safe_mul(v.x).safe_add(self.m11.safe_mul(v.y)).safe_add(self.m12.safe_mul(v.z)),
            self.m20.safe_mul(v.x).safe_add(self.m21.safe_mul(v.y)).safe_add(self.m22.safe_mul(v.z)),
        )
    }

    pub fn determinant(self) -> Fix64 {
        self.m00.safe_mul(self.m11.safe_mul(self.m22).safe_sub(self.m12.safe_mul(self.m21)))
            .safe_sub(self.m01.safe_mul(self.m10.safe_mul(self.m22).safe_sub(self.m12.safe_mul(self.m20))))
            .safe_add(self.m02.safe_mul(self.m10.safe_mul(self.m21).safe_sub(self.m11.safe_mul(self.m20))))
    }

    /// Matrix inverse. Returns the identity if the matrix is (numerically)
    /// singular, since an un-invertible inertia tensor has no physical
    /// meaning and degenerate configurations are recovered from locally
    /// (spec.md section 4.8) rather than propagated as hard errors.
    pub fn inverse(self) -> Self {
        let det = self.determinant();
        if det.is_zero() {
            return Matrix3x3::IDENTITY;
        }
        let inv_det = Fix64::ONE.safe_div(det);

        let c00 = self.m11.safe_mul(self.m22).safe_sub(self.m12.safe_mul(self.m21));
        let c01 = self.m02.safe_mul(self.m21).safe_sub(self.m01.safe_mul(self.m22));
        let c02 = self.m01.safe_mul(self.m12).safe_sub(self.m02.safe_mul(self.m11));
        let c10 = self.m12.safe_mul(self.m20).safe_sub(self.m10.safe_mul(self.m22));
        let c11 = self.m00.safe_mul(self.m22).safe_sub(self.m02.safe_mul(self.m20));
        let c12 = self.m02.safe_mul(self.m10).safe_sub(self.m00.safe_mul(self.m12));
        let c20 = self.m10.safe_mul(self.m21).safe_sub(self.m11.safe_mul(self.m20));
        let c21 = self.m01.safe_mul(self.m20).safe_sub(self.m00.safe_mul(self.m21));
        let c22 = self.m00.safe_mul(self.m11).safe_sub(self.m01.safe_mul(self.m10));

        Matrix3x3::new(
            c00.safe_mul(inv_det), c01.safe_mul(inv_det), c02.safe_mul(inv_det),
            c10.safe_mul(inv_det), c11.safe_mul(inv_det), c12.safe_mul(inv_det),
            c20.safe_mul(inv_det), c21.safe_mul(inv_det), c22.safe_mul(inv_det),
        )
    }

    /// Computes the world-space inverse inertia tensor `R * I_local^-1 * R^T`
    /// (spec.md section 4.6 step 4d).
    pub fn sandwich(self, r: Matrix3x3) -> Matrix3x3 {
        r * self * r.transpose()
    }
}

impl Mul for Matrix3x3 {
    type Output = Matrix3x3;

    fn mul(self, rhs: Self) -> Self {
        let mut out = Matrix3x3::ZERO;
        for row in 0..3 {
            for col in 0..3 {
                let mut acc = Fix64::ZERO;
                for k in 0..3 {
                    acc = acc.safe_add(self.get(row, k).safe_mul(rhs.get(k, col)));
                }
                out.set(row, col, acc);
            }
        }
        out
    }
}

impl Matrix3x3 {
    #[inline]
    fn get(self, row: usize, col: usize) -> Fix64 {
        match (row, col) {
            (0, 0) => self.m00,
            (0, 1) => self.m01,
            (0, 2) => self.m02,
            (1, 0) => self.m10,
            (1, 1) => self.m11,
            (1, 2) => self.m12,
            (2, 0) => self.m20,
            (2, 1) => self.m21,
            (2, 2) => self.m22,
            _ => unreachable!(),
        }
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, v: Fix64) {
        match (row, col) {
            (0, 0) => self.m00 = v,
            (0, 1) => self.m01 = v,
            (0, 2) => self.m02 = v,
            (1, 0) => self.m10 = v,
            (1, 1) => self.m11 = v,
            (1, 2) => self.m12 = v,
            (2, 0) => self.m20 = v,
            (2, 1) => self.m21 = v,
            (2, 2) => self.m22 = v,
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_times_identity() {
        assert_eq!(Matrix3x3::IDENTITY * Matrix3x3::IDENTITY, Matrix3x3::IDENTITY);
    }

    #[test]
    fn inverse_of_diagonal() {
        let d = Vector3::new(Fix64::from_i32(2), Fix64::from_i32(4), Fix64::from_i32(8));
        let m = Matrix3x3::from_diagonal(d);
        let inv = m.inverse();
        let product = m * inv;
        assert!((product.m00.to_f64() - 1.0).abs() < 1e-4);
        assert!((product.m11.to_f64() - 1.0).abs() < 1e-4);
        assert!((product.m22.to_f64() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn transform_vector_identity() {
        let v = Vector3::new(Fix64::ONE, Fix64::TWO, Fix64::from_i32(3));
        assert_eq!(Matrix3x3::IDENTITY.transform_vector(v), v);
    }
}
