use crate::math::Fix64;

use super::coefficient_combine_rule::CoefficientCombineRule;

/// Surface properties shared by reference among entities (spec.md section
/// 3, `Material`: "kinetic friction, static friction, bounciness, and a
/// blending policy").
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub static_friction: Fix64,
    pub kinetic_friction: Fix64,
    pub bounciness: Fix64,
    pub friction_combine_rule: CoefficientCombineRule,
    pub bounciness_combine_rule: CoefficientCombineRule,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            static_friction: Fix64::from_f64(0.6),
            kinetic_friction: Fix64::from_f64(0.5),
            bounciness: Fix64::ZERO,
            friction_combine_rule: CoefficientCombineRule::Average,
            bounciness_combine_rule: CoefficientCombineRule::Average,
        }
    }
}

impl Material {
    pub fn new(static_friction: Fix64, kinetic_friction: Fix64, bounciness: Fix64) -> Self {
        Material { static_friction, kinetic_friction, bounciness, ..Default::default() }
    }

    /// The effective kinetic friction for a contact between two materials.
    pub fn combine_kinetic_friction(a: &Material, b: &Material) -> Fix64 {
        a.friction_combine_rule.combine(
            b.friction_combine_rule,
            a.kinetic_friction,
            b.kinetic_friction,
        )
    }

    /// The effective static friction for a contact between two materials.
    pub fn combine_static_friction(a: &Material, b: &Material) -> Fix64 {
        a.friction_combine_rule.combine(
            b.friction_combine_rule,
            a.static_friction,
            b.static_friction,
        )
    }

    /// The effective bounciness for a contact between two materials.
    pub fn combine_bounciness(a: &Material, b: &Material) -> Fix64 {
        a.bounciness_combine_rule.combine(b.bounciness_combine_rule, a.bounciness, b.bounciness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_materials_average_friction() {
        let a = Material::default();
        let b = Material::default();
        let friction = Material::combine_kinetic_friction(&a, &b);
        assert_eq!(friction, a.kinetic_friction);
    }
}
