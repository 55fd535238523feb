use crate::geometry::Shape;
use crate::math::{Fix64, Quaternion, RigidTransform, Vector3};

use super::activity::{ActivityInfo, RigidBodyChanges};
use super::material::Material;
use super::rigid_body::{BodyStatus, RigidBody};

/// Ergonomic construction path for [`RigidBody`] (SPEC_FULL section 3):
/// spec.md's `Entity` row lists many optional fields (per-body gravity,
/// damping, material) that are awkward to fill in through a bare struct
/// literal, so bodies are assembled through this builder instead, the way
/// the teacher crate builds its own rigid bodies.
pub struct RigidBodyBuilder {
    status: BodyStatus,
    shape: Shape,
    material: Material,
    position: Vector3,
    orientation: Quaternion,
    linear_velocity: Vector3,
    angular_velocity: Vector3,
    mass: Option<Fix64>,
    gravity_override: Option<Vector3>,
    linear_damping: Fix64,
    angular_damping: Fix64,
    ccd_enabled: bool,
}

impl RigidBodyBuilder {
    fn new(status: BodyStatus, shape: Shape) -> Self {
        RigidBodyBuilder {
            status,
            shape,
            material: Material::default(),
            position: Vector3::ZERO,
            orientation: Quaternion::IDENTITY,
            linear_velocity: Vector3::ZERO,
            angular_velocity: Vector3::ZERO,
            mass: None,
            gravity_override: None,
            linear_damping: Fix64::ZERO,
            angular_damping: Fix64::ZERO,
            ccd_enabled: false,
        }
    }

    pub fn dynamic(shape: Shape) -> Self {
        RigidBodyBuilder::new(BodyStatus::Dynamic, shape)
    }

    pub fn kinematic(shape: Shape) -> Self {
        RigidBodyBuilder::new(BodyStatus::Kinematic, shape)
    }

    pub fn fixed(shape: Shape) -> Self {
        RigidBodyBuilder::new(BodyStatus::Static, shape)
    }

    pub fn position(mut self, position: Vector3) -> Self {
        self.position = position;
        self
    }

    pub fn orientation(mut self, orientation: Quaternion) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn linear_velocity(mut self, v: Vector3) -> Self {
        self.linear_velocity = v;
        self
    }

    pub fn angular_velocity(mut self, v: Vector3) -> Self {
        self.angular_velocity = v;
        self
    }

    /// Overrides the mass implied by the shape's volume and a unit density.
    pub fn mass(mut self, mass: Fix64) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn gravity_override(mut self, gravity: Vector3) -> Self {
        self.gravity_override = Some(gravity);
        self
    }

    pub fn linear_damping(mut self, damping: Fix64) -> Self {
        self.linear_damping = damping;
        self
    }

    pub fn angular_damping(mut self, damping: Fix64) -> Self {
        self.angular_damping = damping;
        self
    }

    pub fn ccd_enabled(mut self, enabled: bool) -> Self {
        self.ccd_enabled = enabled;
        self
    }

    pub fn build(self) -> RigidBody {
        let mass = self.mass.unwrap_or_else(|| {
            let volume = self.shape.description().volume;
            if volume.is_zero() {
                Fix64::ONE
            } else {
                volume
            }
        });

        let mut body = RigidBody {
            instance_id: 0,
            status: self.status,
            shape: self.shape,
            material: self.material,
            mass,
            inv_mass: Fix64::ZERO,
            local_inertia: crate::math::Matrix3x3::ZERO,
            inv_local_inertia: crate::math::Matrix3x3::ZERO,
            inv_world_inertia: crate::math::Matrix3x3::ZERO,
            pose: RigidTransform::new(self.position, self.orientation),
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
            gravity_override: self.gravity_override,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            ccd_enabled: self.ccd_enabled,
            activity: ActivityInfo::default(),
            changes: RigidBodyChanges::all(),
            constraint_back_refs: Vec::new(),
            active_set_id: 0,
        };
        body.recompute_mass_properties();
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Shape, Sphere};

    #[test]
    fn dynamic_sphere_has_positive_inverse_mass() {
        let body = RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE }))
            .mass(Fix64::ONE)
            .build();
        assert!(body.inv_mass.to_f64() > 0.0);
    }

    #[test]
    fn static_body_has_zero_inverse_mass() {
        let body = RigidBodyBuilder::fixed(Shape::Sphere(Sphere { radius: Fix64::ONE })).build();
        assert_eq!(body.inv_mass, Fix64::ZERO);
    }
}
