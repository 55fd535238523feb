//! Joint definitions (spec.md section 3, `Constraint` variant row): the
//! anchor geometry, limits, and motors a user attaches between two
//! entities. This module only stores what a joint *is*; the jacobians,
//! effective mass, and impulse solving that make it move a body live in
//! `crate::solver`.

use crate::data::arena::{Arena, Index};
use crate::math::{Fix64, Vector3};

use super::rigid_body_set::RigidBodyHandle;

/// The geometric relationship a joint enforces between its two anchors
/// (spec.md section 3: "joints (ball, point-on-line, distance, no-rotation,
/// revolute, universal)").
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum JointKind {
    /// Pins the two anchor points together; all three relative rotational
    /// degrees of freedom remain free.
    Ball,
    /// Keeps the second body's anchor on a line through the first body's
    /// anchor along `axis`.
    PointOnLine { axis: Vector3 },
    /// Keeps the distance between the two anchors within a fixed range.
    Distance { min: Fix64, max: Fix64 },
    /// Locks relative orientation; anchors may still translate freely.
    NoRotation,
    /// One rotational degree of freedom around `axis`, anchors pinned.
    Revolute { axis: Vector3 },
    /// Two rotational degrees of freedom (universal joint): `axis1` fixed
    /// on body1, `axis2` fixed on body2, constrained to stay perpendicular.
    Universal { axis1: Vector3, axis2: Vector3 },
}

/// A one-sided range limit on a joint's free degree(s) of freedom (spec.md
/// section 3: "limits (distance, linear-axis, swing, twist, revolute)").
/// `error` is the signed violation of the nearest bound, zero when within
/// range -- exposed so scenario tests can assert on it directly (spec.md
/// section 8, scenario 3).
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum JointLimit {
    Distance { min: Fix64, max: Fix64 },
    LinearAxis { axis: Vector3, min: Fix64, max: Fix64 },
    Swing { axis: Vector3, maximum_angle: Fix64 },
    Twist { axis: Vector3, min_angle: Fix64, max_angle: Fix64 },
    Revolute { axis: Vector3, min_angle: Fix64, max_angle: Fix64 },
}

impl JointLimit {
    /// Signed violation for a scalar quantity already measured along the
    /// limit's own axis (distance, angle, ...): positive when above `max`,
    /// negative when below `min`, zero within range.
    pub fn scalar_error(min: Fix64, max: Fix64, value: Fix64) -> Fix64 {
        if value > max {
            value.safe_sub(max)
        } else if value < min {
            value.safe_sub(min)
        } else {
            Fix64::ZERO
        }
    }
}

/// Drives a joint's free degree of freedom toward a target (spec.md
/// section 3: "motors (angular, linear, servo/velocity)").
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum JointMotor {
    Angular { axis: Vector3, target_velocity: Fix64, max_torque: Fix64 },
    Linear { axis: Vector3, target_velocity: Fix64, max_force: Fix64 },
    /// Position servo: drives toward `target_position` at up to `max_force`,
    /// rather than chasing a target velocity.
    Servo { target_position: Fix64, max_force: Fix64 },
}

/// A user-created joint between two entities: anchor frames plus an
/// optional limit and motor. Lifetime is tied to explicit removal, not to
/// any manifold (spec.md section 3, `Constraint` row: "Lifetime tied to...
/// an explicit user joint object").
#[derive(Clone)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Joint {
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
    pub kind: JointKind,
    pub local_anchor1: Vector3,
    pub local_anchor2: Vector3,
    pub limit: Option<JointLimit>,
    pub motor: Option<JointMotor>,
    /// Error-reduction factor applied to the limit's bias velocity
    /// (spec.md section 4.5: "bias is the joint-space error times an
    /// error-reduction factor").
    pub error_reduction: Fix64,
}

impl Joint {
    pub fn new(body1: RigidBodyHandle, body2: RigidBodyHandle, kind: JointKind) -> Self {
        Joint {
            body1,
            body2,
            kind,
            local_anchor1: Vector3::ZERO,
            local_anchor2: Vector3::ZERO,
            limit: None,
            motor: None,
            error_reduction: Fix64::from_f64(0.2),
        }
    }

    pub fn local_anchors(mut self, anchor1: Vector3, anchor2: Vector3) -> Self {
        self.local_anchor1 = anchor1;
        self.local_anchor2 = anchor2;
        self
    }

    pub fn limit(mut self, limit: JointLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn motor(mut self, motor: JointMotor) -> Self {
        self.motor = Some(motor);
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct JointHandle(pub(crate) Index);

impl JointHandle {
    pub fn into_raw_parts(self) -> (usize, u64) {
        self.0.into_raw_parts()
    }

    pub fn from_raw_parts(index: usize, generation: u64) -> Self {
        JointHandle(Index::from_raw_parts(index, generation))
    }
}

/// Owning store of every joint in a `Space` (spec.md section 6:
/// `add_joint`/`remove_joint`).
#[derive(Clone, Default)]
pub struct JointSet {
    joints: Arena<Joint>,
}

impl JointSet {
    pub fn new() -> Self {
        JointSet { joints: Arena::new() }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn insert(&mut self, joint: Joint) -> JointHandle {
        JointHandle(self.joints.insert(joint))
    }

    pub fn remove(&mut self, handle: JointHandle) -> Option<Joint> {
        self.joints.remove(handle.0)
    }

    pub fn get(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter().map(|(i, j)| (JointHandle(i), j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{RigidBody, RigidBodyBuilder, RigidBodySet};
    use crate::geometry::{Shape, Sphere};

    fn body() -> RigidBody {
        RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE })).build()
    }

    #[test]
    fn distance_limit_reports_zero_error_within_range() {
        let error = JointLimit::scalar_error(Fix64::ONE, Fix64::TWO, Fix64::from_f64(1.5));
        assert_eq!(error, Fix64::ZERO);
    }

    #[test]
    fn distance_limit_reports_positive_error_above_range() {
        let error = JointLimit::scalar_error(Fix64::ONE, Fix64::TWO, Fix64::from_f64(3.0));
        assert_eq!(error, Fix64::ONE);
    }

    #[test]
    fn joint_set_insert_remove_round_trip() {
        let mut bodies = RigidBodySet::new();
        let a = bodies.insert(body());
        let b = bodies.insert(body());

        let mut joints = JointSet::new();
        let handle = joints.insert(Joint::new(a, b, JointKind::Ball));
        assert!(joints.get(handle).is_some());
        joints.remove(handle);
        assert!(joints.get(handle).is_none());
    }
}
