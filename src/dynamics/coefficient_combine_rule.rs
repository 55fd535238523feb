use crate::math::Fix64;

/// Rule used to blend two materials' friction or bounciness coefficients
/// into the single value a contact constraint uses (spec.md section 3,
/// `Material`: "a blending policy").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CoefficientCombineRule {
    /// The two coefficients are averaged.
    Average = 0,
    /// The smallest coefficient is chosen.
    Min,
    /// The two coefficients are multiplied.
    Multiply,
    /// The greatest coefficient is chosen.
    Max,
}

impl CoefficientCombineRule {
    /// The rule actually used for a contact is `max(first, second)` by
    /// discriminant, so a single conservative material always wins.
    pub fn combine(self, other: Self, coeff1: Fix64, coeff2: Fix64) -> Fix64 {
        let effective = self.max(other);
        match effective {
            CoefficientCombineRule::Average => coeff1.safe_add(coeff2).safe_mul(Fix64::HALF),
            CoefficientCombineRule::Min => coeff1.min(coeff2),
            CoefficientCombineRule::Multiply => coeff1.safe_mul(coeff2),
            CoefficientCombineRule::Max => coeff1.max(coeff2),
        }
    }

    fn max(self, other: Self) -> Self {
        if other as u8 > self as u8 {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_combine() {
        let rule = CoefficientCombineRule::Average;
        let result = rule.combine(rule, Fix64::from_i32(2), Fix64::from_i32(4));
        assert_eq!(result, Fix64::from_i32(3));
    }

    #[test]
    fn effective_rule_is_the_max_discriminant() {
        let result = CoefficientCombineRule::Min.combine(
            CoefficientCombineRule::Max,
            Fix64::from_i32(2),
            Fix64::from_i32(4),
        );
        assert_eq!(result, Fix64::from_i32(4));
    }
}
