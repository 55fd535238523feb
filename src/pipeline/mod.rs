//! The embeddable entry point (spec.md section 6, "External Interfaces"):
//! the `Space` aggregate, its tunable parameters, and the updateable-hook
//! phases a host can plug into.

mod space;

pub use space::{Hit, Space, UpdateableHook, UpdateablePhase, VolumeQuery};

use crate::math::{Fix64, Vector3};

/// Per-tick solver/narrow-phase/deactivation tuning (spec.md section 6,
/// "Constraint configuration" and "Deactivation configuration").
#[derive(Copy, Clone, Debug)]
pub struct IntegrationParameters {
    pub dt: Fix64,
    pub gravity: Vector3,
    pub velocity_iterations: usize,

    pub softness: Fix64,
    pub error_correction_factor: Fix64,
    pub max_corrective_velocity: Fix64,
    pub bounciness_velocity_threshold: Fix64,
    pub static_friction_velocity_threshold: Fix64,
    pub twist_friction_factor: Fix64,
    pub allowed_penetration: Fix64,
    pub default_margin: Fix64,
    pub contact_invalidation_length: Fix64,
    pub minimum_separation_distance: Fix64,
    pub maximum_contact_distance: Fix64,

    pub velocity_lower_limit: Fix64,
    pub low_velocity_time_minimum: Fix64,
    pub use_stabilization: bool,
    pub max_deactivation_attempts: usize,
    pub max_split_attempts_fraction: Fix64,
    pub min_split_attempts: usize,
}

impl Default for IntegrationParameters {
    fn default() -> Self {
        IntegrationParameters {
            dt: Fix64::from_ratio(1, 60),
            gravity: Vector3::new(Fix64::ZERO, Fix64::from_f64(-9.8), Fix64::ZERO),
            velocity_iterations: 10,

            softness: Fix64::from_f64(0.001),
            error_correction_factor: Fix64::from_f64(0.2),
            max_corrective_velocity: Fix64::from_f64(2.0),
            bounciness_velocity_threshold: Fix64::ONE,
            static_friction_velocity_threshold: Fix64::from_f64(0.2),
            twist_friction_factor: Fix64::ONE,
            allowed_penetration: Fix64::from_f64(0.01),
            default_margin: crate::geometry::DEFAULT_MARGIN,
            contact_invalidation_length: Fix64::from_f64(0.1),
            minimum_separation_distance: Fix64::from_f64(0.03),
            maximum_contact_distance: Fix64::from_f64(0.1),

            velocity_lower_limit: Fix64::from_f64(0.26),
            low_velocity_time_minimum: Fix64::ONE,
            use_stabilization: true,
            max_deactivation_attempts: 100,
            max_split_attempts_fraction: Fix64::from_f64(0.01),
            min_split_attempts: 3,
        }
    }
}

impl IntegrationParameters {
    pub(crate) fn solver_parameters(&self) -> crate::solver::SolverParameters {
        crate::solver::SolverParameters {
            dt: self.dt,
            velocity_iterations: self.velocity_iterations,
            allowed_penetration: self.allowed_penetration,
            stiffness: self.error_correction_factor,
            max_recovery_speed: self.max_corrective_velocity,
            softness_factor: self.softness,
            restitution_velocity_threshold: self.bounciness_velocity_threshold,
        }
    }

    pub(crate) fn narrow_phase_config(&self) -> crate::narrow_phase::NarrowPhaseConfig {
        crate::narrow_phase::NarrowPhaseConfig {
            contact_invalidation_length: self.contact_invalidation_length,
            maximum_contact_distance: self.maximum_contact_distance,
            minimum_contact_separation: self.minimum_separation_distance,
            speculative_contact_distance: self.default_margin,
        }
    }

    pub(crate) fn deactivation_config(&self) -> crate::dynamics::DeactivationConfig {
        crate::dynamics::DeactivationConfig {
            velocity_lower_limit: self.velocity_lower_limit,
            low_velocity_time_minimum: self.low_velocity_time_minimum,
            use_stabilization: self.use_stabilization,
            max_deactivation_attempts: self.max_deactivation_attempts,
            max_split_attempts_fraction: self.max_split_attempts_fraction,
            min_split_attempts: self.min_split_attempts,
        }
    }
}
