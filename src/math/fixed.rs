use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use super::lut_data::{ATAN_LUT, ATAN_STEPS, EXP2_ROOT_LUT, EXP2_ROOT_STEPS, SIN_LUT, SIN_STEPS};

/// Fractional bits of the Q31.32 representation.
pub const FRAC_BITS: u32 = 32;

/// A deterministic, platform-independent signed fixed-point number in Q31.32
/// format: 31 integer bits, a sign bit, and 32 fractional bits, stored as a
/// raw `i64`.
///
/// All arithmetic on `Fix64` is exact integer arithmetic; no `f32`/`f64`
/// ever participates in a computation whose result can flow into simulation
/// state. The plain operator overloads (`+`, `-`, `*`, `/`) wrap on overflow
/// and are meant for hot loops where the caller has already bounded the
/// operands; use [`Fix64::safe_add`], [`Fix64::safe_sub`] and
/// [`Fix64::safe_mul`] when the bound isn't known to hold.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Fix64(i64);

/// Error returned by operations with no real-valued result (`sqrt` of a
/// negative number, `ln`/`log2` of a non-positive number).
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// `sqrt` was called with a negative operand.
    #[error("sqrt of a negative fixed-point value")]
    NegativeSqrt,
    /// `ln`/`log2` was called with a non-positive operand.
    #[error("log of a non-positive fixed-point value")]
    NonPositiveLog,
}

impl Fix64 {
    /// The raw Q31.32 representation of zero.
    pub const ZERO: Fix64 = Fix64(0);
    /// The raw Q31.32 representation of one.
    pub const ONE: Fix64 = Fix64(1i64 << FRAC_BITS);
    /// The raw Q31.32 representation of two.
    pub const TWO: Fix64 = Fix64(2i64 << FRAC_BITS);
    /// The raw Q31.32 representation of one half.
    pub const HALF: Fix64 = Fix64(1i64 << (FRAC_BITS - 1));
    /// The raw Q31.32 representation of negative one.
    pub const NEG_ONE: Fix64 = Fix64(-(1i64 << FRAC_BITS));
    /// Saturating upper bound. Used as the sentinel "miss"/"ignore" value
    /// per spec.md section 4.1 and 7.
    pub const MAX: Fix64 = Fix64(i64::MAX);
    /// Saturating lower bound.
    pub const MIN: Fix64 = Fix64(i64::MIN + 1);
    /// Pi.
    pub const PI: Fix64 = Fix64(13_493_037_705);
    /// 2 * Pi.
    pub const TWO_PI: Fix64 = Fix64(26_986_075_409);
    /// Pi / 2.
    pub const HALF_PI: Fix64 = Fix64(6_746_518_852);
    /// Pi / 4.
    pub const QUARTER_PI: Fix64 = Fix64(3_373_259_426);
    /// Euler's number.
    pub const E: Fix64 = Fix64(11_674_931_555);
    /// ln(2).
    pub const LN2: Fix64 = Fix64(2_977_044_472);
    /// log2(e) = 1 / ln(2).
    pub const LOG2_E: Fix64 = Fix64(6_196_328_019);
    /// sqrt(2).
    pub const SQRT2: Fix64 = Fix64(6_074_001_000);

    /// Builds a `Fix64` from its raw Q31.32 representation.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Fix64(raw)
    }

    /// Returns the raw Q31.32 representation.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Builds a `Fix64` from an integer.
    #[inline]
    pub const fn from_i32(v: i32) -> Self {
        Fix64((v as i64) << FRAC_BITS)
    }

    /// Builds a `Fix64` approximating `numerator / denominator`, both
    /// plain integers. Useful for constants like `Fix64::from_ratio(1, 3)`.
    #[inline]
    pub fn from_ratio(numerator: i64, denominator: i64) -> Self {
        Fix64::from_raw(numerator << FRAC_BITS).safe_div(Fix64::from_raw(denominator << FRAC_BITS))
    }

    /// Truncating conversion to `f64`, for host-side presentation (logging,
    /// debug rendering) only. Never feed the result back into the
    /// simulation: per spec.md section 4.1, floating point must not appear
    /// in derived simulation state.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1i64 << FRAC_BITS) as f64
    }

    /// Lossy conversion from `f64`, intended for constructing test fixtures
    /// and host-authored constants (e.g. reading a designer-specified
    /// gravity vector), never for values computed mid-simulation.
    pub fn from_f64(v: f64) -> Self {
        Fix64((v * (1i64 << FRAC_BITS) as f64).round() as i64)
    }

    /// Whether the value is exactly zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Absolute value. Saturates instead of overflowing on `MIN`.
    #[inline]
    pub fn abs(self) -> Self {
        if self.0 == i64::MIN {
            Fix64::MAX
        } else {
            Fix64(self.0.abs())
        }
    }

    /// Sign: -1, 0 or 1.
    #[inline]
    pub fn signum(self) -> Self {
        match self.0.cmp(&0) {
            Ordering::Less => Fix64::NEG_ONE,
            Ordering::Equal => Fix64::ZERO,
            Ordering::Greater => Fix64::ONE,
        }
    }

    /// Largest integer value less than or equal to `self`.
    #[inline]
    pub fn floor(self) -> Self {
        Fix64(self.0 & !((1i64 << FRAC_BITS) - 1))
    }

    /// Smallest integer value greater than or equal to `self`.
    #[inline]
    pub fn ceil(self) -> Self {
        let floor = self.floor();
        if floor == self {
            floor
        } else {
            floor + Fix64::ONE
        }
    }

    /// Rounds to the nearest integer, ties away from zero.
    #[inline]
    pub fn round(self) -> Self {
        if self.0 >= 0 {
            (self + Fix64::HALF).floor()
        } else {
            -((-self + Fix64::HALF).floor())
        }
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.0 < other.0 {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.0 > other.0 {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn clamp(self, lo: Self, hi: Self) -> Self {
        self.max(lo).min(hi)
    }

    /// Saturating addition.
    #[inline]
    pub fn safe_add(self, rhs: Self) -> Self {
        match self.0.checked_add(rhs.0) {
            Some(v) => Fix64(v),
            None => {
                if rhs.0 > 0 {
                    Fix64::MAX
                } else {
                    Fix64::MIN
                }
            }
        }
    }

    /// Saturating subtraction.
    #[inline]
    pub fn safe_sub(self, rhs: Self) -> Self {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Fix64(v),
            None => {
                if rhs.0 < 0 {
                    Fix64::MAX
                } else {
                    Fix64::MIN
                }
            }
        }
    }

    /// Saturating multiplication.
    #[inline]
    pub fn safe_mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i128) * (rhs.0 as i128);
        let shifted = wide >> FRAC_BITS;
        if shifted > i64::MAX as i128 {
            Fix64::MAX
        } else if shifted < i64::MIN as i128 {
            Fix64::MIN
        } else {
            Fix64(shifted as i64)
        }
    }

    /// Division. Division by zero yields [`Fix64::MAX`] (sign of the
    /// dividend is ignored for the sentinel, matching the "miss" contract
    /// used throughout collision code in spec.md section 4.1/7) rather
    /// than panicking.
    #[inline]
    pub fn safe_div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Fix64::MAX;
        }
        let wide = (self.0 as i128) << FRAC_BITS;
        let result = wide / (rhs.0 as i128);
        if result > i64::MAX as i128 {
            Fix64::MAX
        } else if result < i64::MIN as i128 {
            Fix64::MIN
        } else {
            Fix64(result as i64)
        }
    }

    /// Square root. `DomainError::NegativeSqrt` for negative operands,
    /// matching the scalar layer's documented failure mode.
    pub fn sqrt(self) -> Result<Self, DomainError> {
        if self.0 < 0 {
            return Err(DomainError::NegativeSqrt);
        }
        if self.0 == 0 {
            return Ok(Fix64::ZERO);
        }
        // sqrt(raw / 2^32) * 2^32 == sqrt(raw * 2^32) == isqrt(raw << 32)
        let target = (self.0 as u128) << FRAC_BITS;
        Ok(Fix64(isqrt_u128(target) as i64))
    }

    /// Base-2 logarithm. `DomainError::NonPositiveLog` for non-positive
    /// operands.
    pub fn log2(self) -> Result<Self, DomainError> {
        if self.0 <= 0 {
            return Err(DomainError::NonPositiveLog);
        }
        // Normalize to [1, 2) and track the integer exponent.
        let mut x = self;
        let mut exponent = 0i64;
        while x >= Fix64::TWO {
            x = x.safe_div(Fix64::TWO);
            exponent += 1;
        }
        while x < Fix64::ONE {
            x = x.safe_mul(Fix64::TWO);
            exponent -= 1;
        }

        // x is now in [1, 2). log2(x) via the identity log2(x) = log2(x^2) / 2,
        // squaring until x is close to 1 and accumulating the fractional bits
        // (classic bit-recovery algorithm for binary logarithms).
        let mut frac = Fix64::ZERO;
        let mut bit = Fix64::HALF;
        let mut y = x;
        for _ in 0..FRAC_BITS {
            y = y.safe_mul(y);
            if y >= Fix64::TWO {
                y = y.safe_div(Fix64::TWO);
                frac = frac.safe_add(bit);
            }
            bit = bit.safe_div(Fix64::TWO);
        }

        Ok(Fix64::from_i32(exponent as i32).safe_add(frac))
    }

    /// Natural logarithm, derived from `log2` via `ln(x) = log2(x) / log2(e)`.
    pub fn ln(self) -> Result<Self, DomainError> {
        Ok(self.log2()?.safe_div(Fix64::LOG2_E))
    }

    /// `2^x`, via an integer part shift and a fractional-part bit-recovery
    /// ladder over precomputed roots of two (`EXP2_ROOT_LUT`).
    pub fn exp2(self) -> Self {
        let int_part = self.floor();
        let frac_part = self.safe_sub(int_part);
        let exponent = (int_part.raw() >> FRAC_BITS) as i32;

        let mut result = Fix64::ONE;
        let mut bit = Fix64::HALF;
        let mut remaining = frac_part;
        for k in 0..EXP2_ROOT_STEPS {
            if remaining >= bit {
                remaining = remaining.safe_sub(bit);
                result = result.safe_mul(Fix64::from_raw(EXP2_ROOT_LUT[k]));
            }
            bit = bit.safe_div(Fix64::TWO);
        }

        if exponent >= 0 {
            if exponent >= 63 {
                Fix64::MAX
            } else {
                result.safe_mul(Fix64::from_raw(1i64 << (exponent.min(31) as u32)))
            }
        } else {
            let shift = (-exponent).min(62);
            Fix64(result.0 >> shift)
        }
    }

    /// General power: `base^exponent` for `base > 0`.
    pub fn pow(self, exponent: Self) -> Result<Self, DomainError> {
        if self.0 <= 0 {
            return Err(DomainError::NonPositiveLog);
        }
        let log = self.ln()?;
        Ok(log.safe_mul(exponent).exp2_natural())
    }

    /// `e^x`, expressed via `exp2` and the change-of-base constant.
    fn exp2_natural(self) -> Self {
        self.safe_mul(Fix64::LOG2_E).exp2()
    }

    /// Sine, via a first-quadrant lookup table with mirroring and linear
    /// interpolation between adjacent entries.
    pub fn sin(self) -> Self {
        sin_lookup(self)
    }

    /// Cosine, derived from `sin` by a quarter-turn phase shift.
    pub fn cos(self) -> Self {
        sin_lookup(Fix64::HALF_PI.safe_sub(self))
    }

    /// Tangent, via `sin / cos` (division-by-zero saturates to `MAX`, which
    /// callers treat as "undefined"/"miss").
    pub fn tan(self) -> Self {
        let s = self.sin();
        let c = self.cos();
        s.safe_div(c)
    }

    /// Two-argument arctangent, returning an angle in `(-pi, pi]`.
    pub fn atan2(self, x: Self) -> Self {
        let y = self;
        if x.is_zero() && y.is_zero() {
            return Fix64::ZERO;
        }
        if x.0 == 0 {
            return if y.0 > 0 { Fix64::HALF_PI } else { -Fix64::HALF_PI };
        }

        let atan_of_ratio = |t: Fix64| -> Fix64 {
            // atan is an odd function; the LUT only covers [0, 1].
            let abs_t = t.abs();
            let base = if abs_t <= Fix64::ONE {
                atan_lookup(abs_t)
            } else {
                // atan(t) = pi/2 - atan(1/t) for t > 1.
                Fix64::HALF_PI.safe_sub(atan_lookup(Fix64::ONE.safe_div(abs_t)))
            };
            if t.0 < 0 {
                -base
            } else {
                base
            }
        };

        let ratio = y.safe_div(x);
        let base_angle = atan_of_ratio(ratio);

        if x.0 > 0 {
            base_angle
        } else if y.0 >= 0 {
            base_angle.safe_add(Fix64::PI)
        } else {
            base_angle.safe_sub(Fix64::PI)
        }
    }

    /// Inverse cosine for `x` in `[-1, 1]`, derived from `atan2` and `sqrt`.
    pub fn acos(self) -> Result<Self, DomainError> {
        let clamped = self.clamp(Fix64::NEG_ONE, Fix64::ONE);
        let one_minus_sq = Fix64::ONE.safe_sub(clamped.safe_mul(clamped));
        let sin_part = one_minus_sq.max(Fix64::ZERO).sqrt()?;
        Ok(sin_part.atan2(clamped))
    }

    /// Inverse tangent for a single argument, via `atan2(x, 1)`.
    pub fn atan(self) -> Self {
        self.atan2(Fix64::ONE)
    }
}

fn sin_lookup(angle: Fix64) -> Fix64 {
    // Reduce to [0, 2*pi).
    let mut theta = angle;
    let two_pi = Fix64::TWO_PI;
    if theta.0 < 0 || theta >= two_pi {
        let turns = theta.safe_div(two_pi).floor();
        theta = theta.safe_sub(turns.safe_mul(two_pi));
    }

    // Mirror into the first quadrant, tracking sign and reflection.
    let (quadrant_angle, negate) = if theta <= Fix64::HALF_PI {
        (theta, false)
    } else if theta <= Fix64::PI {
        (Fix64::PI.safe_sub(theta), false)
    } else if theta <= Fix64::PI.safe_add(Fix64::HALF_PI) {
        (theta.safe_sub(Fix64::PI), true)
    } else {
        (Fix64::TWO_PI.safe_sub(theta), true)
    };

    let value = sin_first_quadrant(quadrant_angle);
    if negate {
        -value
    } else {
        value
    }
}

fn sin_first_quadrant(theta: Fix64) -> Fix64 {
    let clamped = theta.clamp(Fix64::ZERO, Fix64::HALF_PI);
    // Map [0, pi/2] onto LUT index space [0, SIN_STEPS].
    let scaled = clamped.safe_mul(Fix64::from_i32(SIN_STEPS as i32)).safe_div(Fix64::HALF_PI);
    let index = (scaled.raw() >> FRAC_BITS) as usize;
    let index = index.min(SIN_STEPS - 1);
    let frac = scaled.safe_sub(Fix64::from_i32(index as i32));

    let a = Fix64::from_raw(SIN_LUT[index]);
    let b = Fix64::from_raw(SIN_LUT[index + 1]);
    a.safe_add((b.safe_sub(a)).safe_mul(frac))
}

fn atan_lookup(t: Fix64) -> Fix64 {
    let clamped = t.clamp(Fix64::ZERO, Fix64::ONE);
    let scaled = clamped.safe_mul(Fix64::from_i32(ATAN_STEPS as i32));
    let index = (scaled.raw() >> FRAC_BITS) as usize;
    let index = index.min(ATAN_STEPS - 1);
    let frac = scaled.safe_sub(Fix64::from_i32(index as i32));

    let a = Fix64::from_raw(ATAN_LUT[index]);
    let b = Fix64::from_raw(ATAN_LUT[index + 1]);
    a.safe_add((b.safe_sub(a)).safe_mul(frac))
}

/// Integer square root of a 128-bit value via Newton's method seeded from
/// the bit length, iterated a fixed number of times so the algorithm's
/// running time depends only on the input's magnitude, never on timing.
fn isqrt_u128(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << ((bits + 1) / 2);
    for _ in 0..64 {
        let next = (x + n / x) / 2;
        if next >= x {
            break;
        }
        x = next;
    }
    while x * x > n {
        x -= 1;
    }
    x
}

impl PartialOrd for Fix64 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fix64 {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Fix64 {
    type Output = Fix64;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Fix64(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Fix64 {
    type Output = Fix64;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Fix64(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Fix64 {
    type Output = Fix64;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i128) * (rhs.0 as i128);
        Fix64((wide >> FRAC_BITS) as i64)
    }
}

impl Div for Fix64 {
    type Output = Fix64;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        self.safe_div(rhs)
    }
}

impl Neg for Fix64 {
    type Output = Fix64;
    #[inline]
    fn neg(self) -> Self {
        Fix64(self.0.wrapping_neg())
    }
}

impl AddAssign for Fix64 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fix64 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Fix64 {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Fix64 {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl fmt::Debug for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fix64({:.6})", self.to_f64())
    }
}

impl fmt::Display for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

impl num_traits::Zero for Fix64 {
    fn zero() -> Self {
        Fix64::ZERO
    }
    fn is_zero(&self) -> bool {
        Fix64::is_zero(*self)
    }
}

impl num_traits::One for Fix64 {
    fn one() -> Self {
        Fix64::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_round_trip() {
        for raw in [0i64, 1, -1, i64::MAX, i64::MIN + 1, 123_456_789] {
            let x = Fix64::from_raw(raw);
            assert_eq!(Fix64::from_raw(x.raw()), x);
        }
    }

    #[test]
    fn safe_add_saturates() {
        assert_eq!(Fix64::MAX.safe_add(Fix64::ONE), Fix64::MAX);
        assert_eq!(Fix64::MIN.safe_add(-Fix64::ONE), Fix64::MIN);
    }

    #[test]
    fn safe_mul_saturates() {
        let big = Fix64::from_i32(1 << 20);
        assert_eq!(big.safe_mul(big), Fix64::MAX);
    }

    #[test]
    fn div_by_zero_is_max() {
        assert_eq!(Fix64::ONE.safe_div(Fix64::ZERO), Fix64::MAX);
    }

    #[test]
    fn sqrt_of_negative_is_domain_error() {
        assert_eq!(Fix64::from_i32(-1).sqrt(), Err(DomainError::NegativeSqrt));
    }

    #[test]
    fn sqrt_four_is_two() {
        let four = Fix64::from_i32(4);
        let root = four.sqrt().unwrap();
        assert!((root.to_f64() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ln_of_e_is_one() {
        let result = Fix64::E.ln().unwrap();
        assert!((result.to_f64() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn ln_exp_round_trip() {
        for v in [-2.0f64, -0.5, 0.0, 0.5, 1.0, 2.5] {
            let x = Fix64::from_f64(v);
            let exp = x.exp2_natural_test();
            let back = exp.ln().unwrap();
            assert!((back.to_f64() - v).abs() < 1e-2, "v={} back={}", v, back.to_f64());
        }
    }

    impl Fix64 {
        fn exp2_natural_test(self) -> Self {
            self.exp2_natural()
        }
    }

    #[test]
    fn sin_cos_known_angles() {
        assert!((Fix64::ZERO.sin().to_f64()).abs() < 1e-4);
        assert!((Fix64::HALF_PI.sin().to_f64() - 1.0).abs() < 1e-3);
        assert!((Fix64::PI.sin().to_f64()).abs() < 1e-3);
        assert!((Fix64::ZERO.cos().to_f64() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn atan2_quadrants() {
        let q1 = Fix64::ONE.atan2(Fix64::ONE);
        assert!((q1.to_f64() - std::f64::consts::FRAC_PI_4).abs() < 1e-2);

        let q2 = Fix64::ONE.atan2(-Fix64::ONE);
        assert!((q2.to_f64() - 3.0 * std::f64::consts::FRAC_PI_4).abs() < 1e-2);
    }

    #[test]
    fn acos_bounds() {
        let a = Fix64::ONE.acos().unwrap();
        assert!(a.to_f64().abs() < 1e-3);
        let b = Fix64::NEG_ONE.acos().unwrap();
        assert!((b.to_f64() - std::f64::consts::PI).abs() < 1e-2);
    }

    #[test]
    fn ordering_is_total() {
        let mut values = vec![Fix64::ONE, Fix64::ZERO, Fix64::NEG_ONE, Fix64::TWO];
        values.sort();
        assert_eq!(
            values,
            vec![Fix64::NEG_ONE, Fix64::ZERO, Fix64::ONE, Fix64::TWO]
        );
    }
}
