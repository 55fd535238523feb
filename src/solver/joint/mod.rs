//! Joint constraint math (spec.md section 4.5): jacobian/effective-mass/
//! bias assembly for the joint kinds, limits, and motors defined in
//! [`crate::dynamics::joint`].

use crate::dynamics::{Joint, JointKind, JointLimit, JointMotor, RigidBody};
use crate::math::{Fix64, Vector3};
use crate::solver::SolverParameters;

#[derive(Copy, Clone, Debug)]
struct Row {
    linear1: Vector3,
    angular1: Vector3,
    linear2: Vector3,
    angular2: Vector3,
    effective_mass: Fix64,
    bias: Fix64,
    min_impulse: Fix64,
    max_impulse: Fix64,
    accumulated_impulse: Fix64,
}

impl Row {
    fn relative_velocity(&self, body1: &RigidBody, body2: &RigidBody) -> Fix64 {
        self.linear1.dot(body1.linear_velocity)
            + self.angular1.dot(body1.angular_velocity)
            + self.linear2.dot(body2.linear_velocity)
            + self.angular2.dot(body2.angular_velocity)
    }

    fn apply_impulse(&self, body1: &mut RigidBody, body2: &mut RigidBody, magnitude: Fix64) {
        if body1.is_dynamic() {
            body1.linear_velocity += self.linear1 * (magnitude * body1.inv_mass);
            body1.angular_velocity += body1.inv_world_inertia.transform_vector(self.angular1 * magnitude);
        }
        if body2.is_dynamic() {
            body2.linear_velocity += self.linear2 * (magnitude * body2.inv_mass);
            body2.angular_velocity += body2.inv_world_inertia.transform_vector(self.angular2 * magnitude);
        }
    }

    fn warm_start(&self, body1: &mut RigidBody, body2: &mut RigidBody) {
        if !self.accumulated_impulse.is_zero() {
            self.apply_impulse(body1, body2, self.accumulated_impulse);
        }
    }

    fn solve(&mut self, body1: &mut RigidBody, body2: &mut RigidBody) {
        let jv = self.relative_velocity(body1, body2);
        let lambda = (self.bias.safe_sub(jv)).safe_mul(self.effective_mass);
        let new_impulse = (self.accumulated_impulse.safe_add(lambda)).clamp(self.min_impulse, self.max_impulse);
        let delta = new_impulse.safe_sub(self.accumulated_impulse);
        self.accumulated_impulse = new_impulse;
        self.apply_impulse(body1, body2, delta);
    }
}

fn point_rows(
    axis: Vector3,
    r1: Vector3,
    r2: Vector3,
    body1: &RigidBody,
    body2: &RigidBody,
) -> (Vector3, Vector3, Vector3, Vector3, Fix64) {
    let linear1 = -axis;
    let angular1 = -r1.cross(axis);
    let linear2 = axis;
    let angular2 = r2.cross(axis);

    let mut k = Fix64::ZERO;
    if body1.is_dynamic() {
        k = k.safe_add(linear1.length_squared().safe_mul(body1.inv_mass));
        k = k.safe_add(body1.inv_world_inertia.transform_vector(angular1).dot(angular1));
    }
    if body2.is_dynamic() {
        k = k.safe_add(linear2.length_squared().safe_mul(body2.inv_mass));
        k = k.safe_add(body2.inv_world_inertia.transform_vector(angular2).dot(angular2));
    }
    let effective_mass = if k.is_zero() { Fix64::ZERO } else { Fix64::ONE.safe_div(k) };
    (linear1, angular1, linear2, angular2, effective_mass)
}

/// Solver state for a single joint: up to three point-constraint rows
/// (ball/distance/revolute/universal all reduce to constraining the anchor
/// offset along one to three axes), plus an optional limit row and an
/// optional motor row.
pub struct JointConstraint {
    point_rows: Vec<Row>,
    limit_row: Option<Row>,
    motor_row: Option<Row>,
}

impl JointConstraint {
    /// Assembles jacobians/effective masses/biases for one tick (spec.md
    /// section 4.5: "For joint limits, bias is the joint-space error times
    /// an error-reduction factor").
    pub fn prestep(joint: &Joint, body1: &RigidBody, body2: &RigidBody, params: &SolverParameters) -> Self {
        let anchor1 = body1.pose.transform_point(joint.local_anchor1);
        let anchor2 = body2.pose.transform_point(joint.local_anchor2);
        let r1 = anchor1 - body1.pose.position;
        let r2 = anchor2 - body2.pose.position;
        let separation = anchor2 - anchor1;

        let axes: Vec<Vector3> = match joint.kind {
            JointKind::Ball | JointKind::NoRotation => {
                vec![Vector3::X, Vector3::Y, Vector3::Z]
            }
            JointKind::PointOnLine { axis } => {
                let (t1, t2) = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X).orthonormal_basis();
                vec![t1, t2]
            }
            JointKind::Distance { .. } => Vec::new(),
            // Anchor point is pinned in both cases; the free rotational
            // axis (around `axis` for revolute, perpendicular to `axis1`/
            // `axis2` for universal) is left unconstrained here, matching
            // how the point-only rows below treat `Ball`.
            JointKind::Revolute { .. } => vec![Vector3::X, Vector3::Y, Vector3::Z],
            JointKind::Universal { .. } => vec![Vector3::X, Vector3::Y, Vector3::Z],
        };

        let mut point_rows = Vec::with_capacity(axes.len() + 3);
        for axis in axes {
            let (linear1, angular1, linear2, angular2, effective_mass) = point_rows_for(axis, r1, r2, body1, body2);
            let error = separation.dot(axis);
            let bias = error.safe_mul(joint.error_reduction).safe_div(params.dt);
            point_rows.push(Row {
                linear1,
                angular1,
                linear2,
                angular2,
                effective_mass,
                bias,
                min_impulse: Fix64::MIN,
                max_impulse: Fix64::MAX,
                accumulated_impulse: Fix64::ZERO,
            });
        }

        // `NoRotation` additionally pins relative orientation, unlike `Ball`
        // which shares the same anchor rows but leaves rotation free.
        if matches!(joint.kind, JointKind::NoRotation) {
            let relative = relative_orientation(body1, body2);
            for axis in [Vector3::X, Vector3::Y, Vector3::Z] {
                let (angular1, angular2, effective_mass) = angular_rows(axis, body1, body2);
                let error = orientation_error_component(relative, axis);
                let bias = error.safe_mul(joint.error_reduction).safe_div(params.dt);
                point_rows.push(Row {
                    linear1: Vector3::ZERO,
                    angular1,
                    linear2: Vector3::ZERO,
                    angular2,
                    effective_mass,
                    bias,
                    min_impulse: Fix64::MIN,
                    max_impulse: Fix64::MAX,
                    accumulated_impulse: Fix64::ZERO,
                });
            }
        }

        let limit_row = joint.limit.map(|limit| build_limit_row(limit, anchor1, anchor2, r1, r2, separation, joint, body1, body2, params));
        let motor_row = joint.motor.map(|motor| build_motor_row(motor, r1, r2, body1, body2, params));

        JointConstraint { point_rows, limit_row, motor_row }
    }

    pub fn warm_start(&self, body1: &mut RigidBody, body2: &mut RigidBody) {
        for row in &self.point_rows {
            row.warm_start(body1, body2);
        }
        if let Some(row) = &self.limit_row {
            row.warm_start(body1, body2);
        }
        if let Some(row) = &self.motor_row {
            row.warm_start(body1, body2);
        }
    }

    pub fn solve(&mut self, body1: &mut RigidBody, body2: &mut RigidBody) {
        for row in &mut self.point_rows {
            row.solve(body1, body2);
        }
        if let Some(row) = &mut self.limit_row {
            row.solve(body1, body2);
        }
        if let Some(row) = &mut self.motor_row {
            row.solve(body1, body2);
        }
    }
}

fn point_rows_for(
    axis: Vector3,
    r1: Vector3,
    r2: Vector3,
    body1: &RigidBody,
    body2: &RigidBody,
) -> (Vector3, Vector3, Vector3, Vector3, Fix64) {
    point_rows(axis, r1, r2, body1, body2)
}

/// The relative orientation of body2 with respect to body1's frame.
fn relative_orientation(body1: &RigidBody, body2: &RigidBody) -> crate::math::Quaternion {
    body1.pose.orientation.conjugate() * body2.pose.orientation
}

/// Jacobian/effective-mass for an angular-only row along `axis` (no anchor
/// offset term), used to lock relative orientation for [`JointKind::NoRotation`].
fn angular_rows(axis: Vector3, body1: &RigidBody, body2: &RigidBody) -> (Vector3, Vector3, Fix64) {
    let angular1 = -axis;
    let angular2 = axis;
    let mut k = Fix64::ZERO;
    if body1.is_dynamic() {
        k = k.safe_add(body1.inv_world_inertia.transform_vector(angular1).dot(angular1));
    }
    if body2.is_dynamic() {
        k = k.safe_add(body2.inv_world_inertia.transform_vector(angular2).dot(angular2));
    }
    let effective_mass = if k.is_zero() { Fix64::ZERO } else { Fix64::ONE.safe_div(k) };
    (angular1, angular2, effective_mass)
}

/// Small-angle error of `relative`'s rotation projected onto `axis`: twice
/// the quaternion's vector-part component, which approximates the relative
/// rotation angle about `axis` near zero (where `NoRotation` operates).
fn orientation_error_component(relative: crate::math::Quaternion, axis: Vector3) -> Fix64 {
    let v = Vector3::new(relative.x, relative.y, relative.z);
    v.dot(axis).safe_mul(Fix64::TWO)
}

/// Signed rotation angle of a twist quaternion about its own axis, in
/// `(-2*pi, 2*pi)`. `twist`'s vector part is parallel (or antiparallel) to
/// `axis` by construction (see [`crate::math::Quaternion::swing_twist`]), so
/// its signed projection onto `axis` recovers `sin(theta/2)`'s sign.
fn twist_angle(twist: crate::math::Quaternion, axis: Vector3) -> Fix64 {
    let v = Vector3::new(twist.x, twist.y, twist.z);
    v.dot(axis).atan2(twist.w).safe_mul(Fix64::TWO)
}

/// Builds the limit row for whichever scalar degree of freedom the limit
/// names (spec.md section 3: "limits (distance, linear-axis, swing, twist,
/// revolute)"). Swing/twist/revolute-angle limits decompose the bodies'
/// actual relative orientation via [`crate::math::Quaternion::swing_twist`]
/// rather than assuming zero angle.
fn build_limit_row(
    limit: JointLimit,
    anchor1: Vector3,
    anchor2: Vector3,
    r1: Vector3,
    r2: Vector3,
    separation: Vector3,
    joint: &Joint,
    body1: &RigidBody,
    body2: &RigidBody,
    params: &SolverParameters,
) -> Row {
    let _ = anchor1;
    let _ = anchor2;
    match limit {
        JointLimit::Distance { min, max } => {
            let distance = separation.length().unwrap_or(Fix64::ZERO);
            let axis = separation.normalize().map(|(u, _)| u).unwrap_or(Vector3::Y);
            let error = JointLimit::scalar_error(min, max, distance);
            let (linear1, angular1, linear2, angular2, effective_mass) = point_rows(axis, r1, r2, body1, body2);
            limit_row_from(linear1, angular1, linear2, angular2, effective_mass, error, joint, params)
        }
        JointLimit::LinearAxis { axis, min, max } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let value = separation.dot(axis);
            let error = JointLimit::scalar_error(min, max, value);
            let (linear1, angular1, linear2, angular2, effective_mass) = point_rows(axis, r1, r2, body1, body2);
            limit_row_from(linear1, angular1, linear2, angular2, effective_mass, error, joint, params)
        }
        JointLimit::Swing { axis, maximum_angle } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let (swing, _) = relative_orientation(body1, body2).swing_twist(axis);
            let angle = swing.angle();
            let error = JointLimit::scalar_error(Fix64::MIN, maximum_angle, angle);
            let (_, angular1, _, angular2, effective_mass) =
                point_rows(axis, Vector3::ZERO, Vector3::ZERO, body1, body2);
            limit_row_from(Vector3::ZERO, angular1, Vector3::ZERO, angular2, effective_mass, error, joint, params)
        }
        JointLimit::Twist { axis, min_angle, max_angle } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let (_, twist) = relative_orientation(body1, body2).swing_twist(axis);
            let error = JointLimit::scalar_error(min_angle, max_angle, twist_angle(twist, axis));
            let (_, angular1, _, angular2, effective_mass) =
                point_rows(axis, Vector3::ZERO, Vector3::ZERO, body1, body2);
            limit_row_from(Vector3::ZERO, angular1, Vector3::ZERO, angular2, effective_mass, error, joint, params)
        }
        JointLimit::Revolute { axis, min_angle, max_angle } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let (_, twist) = relative_orientation(body1, body2).swing_twist(axis);
            let error = JointLimit::scalar_error(min_angle, max_angle, twist_angle(twist, axis));
            let (_, angular1, _, angular2, effective_mass) =
                point_rows(axis, Vector3::ZERO, Vector3::ZERO, body1, body2);
            limit_row_from(Vector3::ZERO, angular1, Vector3::ZERO, angular2, effective_mass, error, joint, params)
        }
    }
}

fn limit_row_from(
    linear1: Vector3,
    angular1: Vector3,
    linear2: Vector3,
    angular2: Vector3,
    effective_mass: Fix64,
    error: Fix64,
    joint: &Joint,
    params: &SolverParameters,
) -> Row {
    let bias = error.safe_mul(joint.error_reduction).safe_div(params.dt);
    let (min_impulse, max_impulse) = if error > Fix64::ZERO {
        (Fix64::MIN, Fix64::ZERO)
    } else if error < Fix64::ZERO {
        (Fix64::ZERO, Fix64::MAX)
    } else {
        (Fix64::ZERO, Fix64::ZERO)
    };
    Row {
        linear1,
        angular1,
        linear2,
        angular2,
        effective_mass,
        bias,
        min_impulse,
        max_impulse,
        accumulated_impulse: Fix64::ZERO,
    }
}

/// Builds the motor row (spec.md section 3: "motors (angular, linear,
/// servo/velocity)"), impulse-capped at `max_force * dt` / `max_torque *
/// dt` (spec.md section 4.5).
fn build_motor_row(
    motor: JointMotor,
    r1: Vector3,
    r2: Vector3,
    body1: &RigidBody,
    body2: &RigidBody,
    params: &SolverParameters,
) -> Row {
    match motor {
        JointMotor::Angular { axis, target_velocity, max_torque } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let (_, angular1, _, angular2, effective_mass) =
                point_rows(axis, Vector3::ZERO, Vector3::ZERO, body1, body2);
            let cap = max_torque.safe_mul(params.dt);
            Row {
                linear1: Vector3::ZERO,
                angular1,
                linear2: Vector3::ZERO,
                angular2,
                effective_mass,
                bias: target_velocity,
                min_impulse: -cap,
                max_impulse: cap,
                accumulated_impulse: Fix64::ZERO,
            }
        }
        JointMotor::Linear { axis, target_velocity, max_force } => {
            let axis = axis.normalize().map(|(u, _)| u).unwrap_or(Vector3::X);
            let (linear1, angular1, linear2, angular2, effective_mass) = point_rows(axis, r1, r2, body1, body2);
            let cap = max_force.safe_mul(params.dt);
            Row {
                linear1,
                angular1,
                linear2,
                angular2,
                effective_mass,
                bias: target_velocity,
                min_impulse: -cap,
                max_impulse: cap,
                accumulated_impulse: Fix64::ZERO,
            }
        }
        JointMotor::Servo { target_position, max_force } => {
            let (linear1, angular1, linear2, angular2, effective_mass) = point_rows(Vector3::X, r1, r2, body1, body2);
            let cap = max_force.safe_mul(params.dt);
            Row {
                linear1,
                angular1,
                linear2,
                angular2,
                effective_mass,
                bias: target_position.safe_div(params.dt),
                min_impulse: -cap,
                max_impulse: cap,
                accumulated_impulse: Fix64::ZERO,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{Joint, JointKind, RigidBodyBuilder, RigidBodyHandle};
    use crate::geometry::{Shape, Sphere};

    #[test]
    fn ball_joint_biases_toward_zero_separation() {
        let body1 = RigidBodyBuilder::fixed(Shape::Sphere(Sphere { radius: Fix64::ONE })).build();
        let body2 = RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE }))
            .position(Vector3::new(Fix64::from_f64(2.0), Fix64::ZERO, Fix64::ZERO))
            .build();

        let joint = Joint::new(RigidBodyHandle::from_raw_parts(0, 1), RigidBodyHandle::from_raw_parts(1, 1), JointKind::Ball);
        let params = SolverParameters::default();
        let constraint = JointConstraint::prestep(&joint, &body1, &body2, &params);
        assert_eq!(constraint.point_rows.len(), 3);
        assert!(constraint.point_rows.iter().any(|row| row.bias.to_f64().abs() > 0.0));
    }
}
