use crate::geometry::{BoundingBox, Shape};
use crate::math::{Fix64, Matrix3x3, Quaternion, RigidTransform, Vector3};

use super::activity::{ActivityInfo, RigidBodyChanges};
use super::material::Material;

/// Whether a body is simulated, driven externally, or immovable (spec.md
/// section 3's "kinematic flag", generalized to the three statuses the
/// pipeline's `add_entity`/`add_static` split implies).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyStatus {
    /// Simulated under gravity, collisions and constraints.
    Dynamic,
    /// Infinite mass; velocity is set directly by the host, never by the
    /// solver.
    Kinematic,
    /// Infinite mass and permanently at rest; never integrated.
    Static,
}

/// A rigid body: identity, mass/inertia, pose, velocities, material, and
/// activity bookkeeping (spec.md section 3, `Entity` row).
#[derive(Clone)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RigidBody {
    pub instance_id: u64,
    pub status: BodyStatus,
    pub shape: Shape,
    pub material: Material,

    pub mass: Fix64,
    pub inv_mass: Fix64,
    pub local_inertia: Matrix3x3,
    pub inv_local_inertia: Matrix3x3,
    pub inv_world_inertia: Matrix3x3,

    pub pose: RigidTransform,
    pub linear_velocity: Vector3,
    pub angular_velocity: Vector3,

    /// Overrides the `Space`'s gravity for this body alone, when set
    /// (spec.md section 3: "optional per-body gravity").
    pub gravity_override: Option<Vector3>,
    pub linear_damping: Fix64,
    pub angular_damping: Fix64,

    /// Whether this body participates in continuous collision detection
    /// (spec.md section 4.6 step 4c).
    pub ccd_enabled: bool,

    pub activity: ActivityInfo,
    pub changes: RigidBodyChanges,

    /// Handles of constraints (contact or joint) this body currently
    /// participates in, kept in sync by the narrow phase and joint set.
    pub(crate) constraint_back_refs: Vec<crate::data::arena::Index>,

    pub(crate) active_set_id: usize,
}

impl RigidBody {
    pub fn is_dynamic(&self) -> bool {
        self.status == BodyStatus::Dynamic
    }

    pub fn is_kinematic(&self) -> bool {
        self.status == BodyStatus::Kinematic
    }

    pub fn is_static(&self) -> bool {
        self.status == BodyStatus::Static
    }

    /// Recomputes `local_inertia`/`inv_local_inertia` from the shape
    /// description scaled by `mass`, and `inv_mass` from `mass` (zero for
    /// non-dynamic bodies, matching the "infinite mass" convention).
    pub fn recompute_mass_properties(&mut self) {
        if !self.is_dynamic() {
            self.inv_mass = Fix64::ZERO;
            self.local_inertia = Matrix3x3::ZERO;
            self.inv_local_inertia = Matrix3x3::ZERO;
            return;
        }

        self.inv_mass = Fix64::ONE.safe_div(self.mass);
        let desc = self.shape.description();
        let unit = desc.unit_inertia;
        let scaled = Matrix3x3::new(
            unit.m00.safe_mul(self.mass),
            unit.m01.safe_mul(self.mass),
            unit.m02.safe_mul(self.mass),
            unit.m10.safe_mul(self.mass),
            unit.m11.safe_mul(self.mass),
            unit.m12.safe_mul(self.mass),
            unit.m20.safe_mul(self.mass),
            unit.m21.safe_mul(self.mass),
            unit.m22.safe_mul(self.mass),
        );
        self.local_inertia = scaled;
        self.inv_local_inertia = scaled.inverse();
        self.recompute_world_inertia();
    }

    /// Recomputes the world-space inverse inertia tensor `R * I^-1 * R^T`
    /// (spec.md section 4.6 step 4d), called once per integration step and
    /// whenever orientation is set directly by the host.
    pub fn recompute_world_inertia(&mut self) {
        if !self.is_dynamic() {
            self.inv_world_inertia = Matrix3x3::ZERO;
            return;
        }
        let r = self.pose.orientation.to_matrix();
        self.inv_world_inertia = self.inv_local_inertia.sandwich(r);
    }

    pub fn world_bounding_box(&self) -> BoundingBox {
        self.shape.local_bounding_box(self.pose)
    }

    /// The velocity of a world-space point attached to this body:
    /// `v + omega x (p - center_of_mass)`.
    pub fn point_velocity(&self, world_point: Vector3) -> Vector3 {
        let r = world_point - self.pose.position;
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    pub fn kinetic_energy(&self) -> Fix64 {
        if !self.is_dynamic() {
            return Fix64::ZERO;
        }
        let linear = self.linear_velocity.length_squared().safe_mul(self.mass).safe_mul(Fix64::HALF);
        let angular_vec = self.inv_local_inertia.inverse().transform_vector(self.angular_velocity);
        let angular = angular_vec.dot(self.angular_velocity).safe_mul(Fix64::HALF);
        linear.safe_add(angular)
    }

    pub fn wake_up(&mut self) {
        self.activity.wake_up();
    }

    /// Advances pose by one integration step (spec.md section 4.6 step 4a/
    /// 4b), called by the solver's integration phase for active dynamic and
    /// kinematic bodies.
    pub fn integrate_pose(&mut self, dt: Fix64) {
        if self.is_static() {
            return;
        }
        let orientation = self.pose.orientation.integrate(self.angular_velocity, dt);
        let position = self.pose.position + self.linear_velocity * dt;
        self.pose = RigidTransform::new(position, orientation);
        if self.is_dynamic() {
            self.recompute_world_inertia();
        }
    }

    /// Applies per-tick damping: `v <- v * (1 - damping)^dt` approximated
    /// via `v <- v * (1 - damping * dt)` clamped to non-negative factors,
    /// the common fixed-point-friendly linearization of the continuous
    /// damping law (spec.md section 4.6 step 5).
    pub fn apply_damping(&mut self, dt: Fix64) {
        if !self.is_dynamic() {
            return;
        }
        let linear_factor = Fix64::ONE.safe_sub(self.linear_damping.safe_mul(dt)).max(Fix64::ZERO);
        let angular_factor = Fix64::ONE.safe_sub(self.angular_damping.safe_mul(dt)).max(Fix64::ZERO);
        self.linear_velocity = self.linear_velocity * linear_factor;
        self.angular_velocity = self.angular_velocity * angular_factor;
    }

    pub(crate) fn reset_internal_references(&mut self) {
        self.constraint_back_refs.clear();
        self.activity = ActivityInfo::default();
        self.active_set_id = 0;
    }
}
