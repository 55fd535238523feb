use std::ops::Mul;

use super::fixed::Fix64;
use super::matrix::Matrix3x3;
use super::vector::Vector3;

/// A unit quaternion over [`Fix64`].
///
/// By contract every `Quaternion` reaching simulation state is unit-norm;
/// [`Quaternion::integrate`] renormalizes after each orientation update
/// (spec.md section 4.6 step 4a) and the testable property in spec.md
/// section 8 (`||orientation(b)|| = 1 +/- eps_q`) depends on callers
/// upholding this.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Quaternion {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
    pub w: Fix64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: Fix64::ZERO,
        y: Fix64::ZERO,
        z: Fix64::ZERO,
        w: Fix64::ONE,
    };

    #[inline]
    pub const fn new_unchecked(x: Fix64, y: Fix64, z: Fix64, w: Fix64) -> Self {
        Quaternion { x, y, z, w }
    }

    /// Builds a quaternion from an axis (assumed non-zero) and an angle.
    pub fn from_axis_angle(axis: Vector3, angle: Fix64) -> Self {
        let (axis, _) = axis.normalize().unwrap_or((Vector3::Y, Fix64::ONE));
        let half = angle.safe_div(Fix64::TWO);
        let s = half.sin();
        let c = half.cos();
        Quaternion::new_unchecked(axis.x * s, axis.y * s, axis.z * s, c).normalize()
    }

    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x.safe_mul(rhs.x)
            .safe_add(self.y.safe_mul(rhs.y))
            .safe_add(self.z.safe_mul(rhs.z))
            .safe_add(self.w.safe_mul(rhs.w))
    }

    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    /// Renormalizes this quaternion, matching the corrective step every
    /// integration pass performs.
    pub fn normalize(self) -> Self {
        match self.length_squared().sqrt() {
            Ok(len) if !len.is_zero() => {
                let inv = Fix64::ONE.safe_div(len);
                Quaternion::new_unchecked(
                    self.x.safe_mul(inv),
                    self.y.safe_mul(inv),
                    self.z.safe_mul(inv),
                    self.w.safe_mul(inv),
                )
            }
            _ => Quaternion::IDENTITY,
        }
    }

    #[inline]
    pub fn conjugate(self) -> Self {
        Quaternion::new_unchecked(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotates a vector by this (unit) quaternion.
    pub fn rotate(self, v: Vector3) -> Vector3 {
        let qv = Vector3::new(self.x, self.y, self.z);
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        let two = Fix64::TWO;
        v + (uv * self.w + uuv) * two
    }

    /// Integrates the quaternion derivative `1/2 * omega * q` over `dt`,
    /// then renormalizes. This is the orientation-update step used by the
    /// solver's integration phase (spec.md section 4.6 step 4a).
    pub fn integrate(self, angular_velocity: Vector3, dt: Fix64) -> Self {
        let half_dt = dt.safe_div(Fix64::TWO);
        let omega = Quaternion::new_unchecked(
            angular_velocity.x,
            angular_velocity.y,
            angular_velocity.z,
            Fix64::ZERO,
        );
        let derivative = omega * self;
        let updated = Quaternion::new_unchecked(
            self.x.safe_add(derivative.x.safe_mul(half_dt)),
            self.y.safe_add(derivative.y.safe_mul(half_dt)),
            self.z.safe_add(derivative.z.safe_mul(half_dt)),
            self.w.safe_add(derivative.w.safe_mul(half_dt)),
        );
        updated.normalize()
    }

    /// Converts to a rotation matrix, used to keep the world inertia tensor
    /// in sync with orientation (spec.md section 4.6 step 4d).
    pub fn to_matrix(self) -> Matrix3x3 {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        let two = Fix64::TWO;
        let xx = x.safe_mul(x);
        let yy = y.safe_mul(y);
        let zz = z.safe_mul(z);
        let xy = x.safe_mul(y);
        let xz = x.safe_mul(z);
        let yz = y.safe_mul(z);
        let wx = w.safe_mul(x);
        let wy = w.safe_mul(y);
        let wz = w.safe_mul(z);

        Matrix3x3::new(
            Fix64::ONE.safe_sub(two.safe_mul(yy.safe_add(zz))),
            two.safe_mul(xy.safe_sub(wz)),
            two.safe_mul(xz.safe_add(wy)),
            two.safe_mul(xy.safe_add(wz)),
            Fix64::ONE.safe_sub(two.safe_mul(xx.safe_add(zz))),
            two.safe_mul(yz.safe_sub(wx)),
            two.safe_mul(xz.safe_sub(wy)),
            two.safe_mul(yz.safe_add(wx)),
            Fix64::ONE.safe_sub(two.safe_mul(xx.safe_add(yy))),
        )
    }

    /// The rotation angle this quaternion represents, in `[0, pi]`.
    pub fn angle(self) -> Fix64 {
        self.w.clamp(-Fix64::ONE, Fix64::ONE).acos().unwrap_or(Fix64::ZERO).safe_mul(Fix64::TWO)
    }

    /// Splits this (unit) quaternion into a twist about `axis` and the
    /// remaining swing, such that `self == swing * twist` (spec.md section
    /// 3: swing/twist joint limits). `axis` is assumed to be a unit vector
    /// expressed in the same space as `self`.
    pub fn swing_twist(self, axis: Vector3) -> (Quaternion, Quaternion) {
        let v = Vector3::new(self.x, self.y, self.z);
        let projection = axis * v.dot(axis);
        let twist = Quaternion::new_unchecked(projection.x, projection.y, projection.z, self.w).normalize();
        let swing = self * twist.conjugate();
        (swing, twist)
    }

    /// Recovers a unit quaternion from a rotation matrix, using the
    /// numerically-stable largest-diagonal-term branch. The result is
    /// sign-ambiguous (`q` and `-q` represent the same rotation); callers
    /// that need a canonical form should compare both signs.
    pub fn from_matrix(m: Matrix3x3) -> Self {
        let trace = m.m00.safe_add(m.m11).safe_add(m.m22);
        if trace > Fix64::ZERO {
            let s = (trace.safe_add(Fix64::ONE)).sqrt().unwrap_or(Fix64::ONE).safe_mul(Fix64::TWO);
            let inv_s = Fix64::ONE.safe_div(s);
            Quaternion::new_unchecked(
                (m.m21.safe_sub(m.m12)).safe_mul(inv_s),
                (m.m02.safe_sub(m.m20)).safe_mul(inv_s),
                (m.m10.safe_sub(m.m01)).safe_mul(inv_s),
                s.safe_div(Fix64::from_i32(4)),
            )
            .normalize()
        } else if m.m00 > m.m11 && m.m00 > m.m22 {
            let s = (Fix64::ONE.safe_add(m.m00).safe_sub(m.m11).safe_sub(m.m22))
                .sqrt()
                .unwrap_or(Fix64::ONE)
                .safe_mul(Fix64::TWO);
            let inv_s = Fix64::ONE.safe_div(s);
            Quaternion::new_unchecked(
                s.safe_div(Fix64::from_i32(4)),
                (m.m01.safe_add(m.m10)).safe_mul(inv_s),
                (m.m02.safe_add(m.m20)).safe_mul(inv_s),
                (m.m21.safe_sub(m.m12)).safe_mul(inv_s),
            )
            .normalize()
        } else if m.m11 > m.m22 {
            let s = (Fix64::ONE.safe_add(m.m11).safe_sub(m.m00).safe_sub(m.m22))
                .sqrt()
                .unwrap_or(Fix64::ONE)
                .safe_mul(Fix64::TWO);
            let inv_s = Fix64::ONE.safe_div(s);
            Quaternion::new_unchecked(
                (m.m01.safe_add(m.m10)).safe_mul(inv_s),
                s.safe_div(Fix64::from_i32(4)),
                (m.m12.safe_add(m.m21)).safe_mul(inv_s),
                (m.m02.safe_sub(m.m20)).safe_mul(inv_s),
            )
            .normalize()
        } else {
            let s = (Fix64::ONE.safe_add(m.m22).safe_sub(m.m00).safe_sub(m.m11))
                .sqrt()
                .unwrap_or(Fix64::ONE)
                .safe_mul(Fix64::TWO);
            let inv_s = Fix64::ONE.safe_div(s);
            Quaternion::new_unchecked(
                (m.m02.safe_add(m.m20)).safe_mul(inv_s),
                (m.m12.safe_add(m.m21)).safe_mul(inv_s),
                s.safe_div(Fix64::from_i32(4)),
                (m.m10.safe_sub(m.m01)).safe_mul(inv_s),
            )
            .normalize()
        }
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Self) -> Self {
        Quaternion::new_unchecked(
            self.w.safe_mul(rhs.x) + self.x.safe_mul(rhs.w) + self.y.safe_mul(rhs.z)
                - self.z.safe_mul(rhs.y),
            self.w.safe_mul(rhs.y) - self.x.safe_mul(rhs.z)
                + self.y.safe_mul(rhs.w)
                + self.z.safe_mul(rhs.x),
            self.w.safe_mul(rhs.z) + self.x.safe_mul(rhs.y) - self.y.safe_mul(rhs.x)
                + self.z.safe_mul(rhs.w),
            self.w.safe_mul(rhs.w) - self.x.safe_mul(rhs.x) - self.y.safe_mul(rhs.y)
                - self.z.safe_mul(rhs.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rotates_nothing() {
        let v = Vector3::new(Fix64::ONE, Fix64::TWO, Fix64::from_i32(3));
        assert_eq!(Quaternion::IDENTITY.rotate(v), v);
    }

    #[test]
    fn axis_angle_quarter_turn() {
        let q = Quaternion::from_axis_angle(Vector3::Z, Fix64::HALF_PI);
        let rotated = q.rotate(Vector3::X);
        assert!((rotated.x.to_f64()).abs() < 1e-2);
        assert!((rotated.y.to_f64() - 1.0).abs() < 1e-2);
    }

    #[test]
    fn matrix_round_trip() {
        let q = Quaternion::from_axis_angle(Vector3::new(Fix64::ONE, Fix64::ONE, Fix64::ZERO), Fix64::QUARTER_PI);
        let m = q.to_matrix();
        let back = Quaternion::from_matrix(m);
        // Sign-ambiguous: compare both signs.
        let same = (q.dot(back).to_f64() - 1.0).abs() < 1e-2
            || (q.dot(back).to_f64() + 1.0).abs() < 1e-2;
        assert!(same, "q={:?} back={:?}", q, back);
    }

    #[test]
    fn stays_unit_after_many_integrations() {
        let mut q = Quaternion::IDENTITY;
        let omega = Vector3::new(Fix64::from_f64(0.3), Fix64::from_f64(0.1), Fix64::ZERO);
        let dt = Fix64::from_f64(1.0 / 60.0);
        for _ in 0..240 {
            q = q.integrate(omega, dt);
        }
        assert!((q.length_squared().to_f64() - 1.0).abs() < 1e-3);
    }
}
