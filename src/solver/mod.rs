//! Projected Gauss-Seidel velocity solver with warm starting (spec.md
//! section 4.5 and 4.6). Contact constraints live here; joint constraints
//! are in [`joint`].

pub mod joint;

use crate::dynamics::{RigidBody, RigidBodyHandle, RigidBodySet};
use crate::math::{Fix64, Vector3};
use crate::narrow_phase::ContactManifold;

/// Global solver tuning (spec.md section 4.5/4.6 and section 6).
#[derive(Copy, Clone, Debug)]
pub struct SolverParameters {
    pub dt: Fix64,
    pub velocity_iterations: usize,
    pub allowed_penetration: Fix64,
    pub stiffness: Fix64,
    pub max_recovery_speed: Fix64,
    /// Global softness tuning knob `S` (spec.md section 4.5).
    pub softness_factor: Fix64,
    /// Relative normal velocity above which a bouncy contact's bias blends
    /// in a fraction of the pre-impact velocity.
    pub restitution_velocity_threshold: Fix64,
}

impl Default for SolverParameters {
    fn default() -> Self {
        SolverParameters {
            dt: Fix64::from_ratio(1, 60),
            velocity_iterations: 10,
            allowed_penetration: Fix64::from_f64(0.01),
            stiffness: Fix64::from_f64(0.2),
            max_recovery_speed: Fix64::from_f64(4.0),
            softness_factor: Fix64::from_f64(0.001),
            restitution_velocity_threshold: Fix64::from_f64(1.0),
        }
    }
}

/// One row of the sequential-impulse solver: a Jacobian (as two
/// linear/angular pairs, one per body), an effective mass, a bias
/// velocity, a softness term, and the impulse accumulated so far this tick
/// plus the one carried over from last tick for warm starting (spec.md
/// section 4.5).
#[derive(Copy, Clone, Debug)]
struct Row {
    linear1: Vector3,
    angular1: Vector3,
    linear2: Vector3,
    angular2: Vector3,
    effective_mass: Fix64,
    bias: Fix64,
    softness: Fix64,
    accumulated_impulse: Fix64,
    min_impulse: Fix64,
    max_impulse: Fix64,
}

impl Row {
    fn relative_velocity(&self, body1: &RigidBody, body2: &RigidBody) -> Fix64 {
        let v1 = self.linear1.dot(body1.linear_velocity) + self.angular1.dot(body1.angular_velocity);
        let v2 = self.linear2.dot(body2.linear_velocity) + self.angular2.dot(body2.angular_velocity);
        v1.safe_add(v2)
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

    /// One sequential-impulse update (spec.md section 4.6, step 3):
    /// `lambda = (bias - J*v) * effective_mass - softness * accumulated`,
    /// clamped into `[min_impulse, max_impulse]`.
    fn solve(&mut self, body1: &mut RigidBody, body2: &mut RigidBody) {
        let jv = self.relative_velocity(body1, body2);
        let lambda = (self.bias.safe_sub(jv)).safe_mul(self.effective_mass)
            .safe_sub(self.softness.safe_mul(self.accumulated_impulse));
        let new_impulse = (self.accumulated_impulse.safe_add(lambda)).clamp(self.min_impulse, self.max_impulse);
        let delta = new_impulse.safe_sub(self.accumulated_impulse);
        self.accumulated_impulse = new_impulse;
        self.apply_impulse(body1, body2, delta);
    }
}

fn effective_mass_of(row_linear1: Vector3, row_angular1: Vector3, row_linear2: Vector3, row_angular2: Vector3, body1: &RigidBody, body2: &RigidBody) -> Fix64 {
    let mut k = Fix64::ZERO;
    if body1.is_dynamic() {
        k = k.safe_add(row_linear1.length_squared().safe_mul(body1.inv_mass));
        k = k.safe_add(body1.inv_world_inertia.transform_vector(row_angular1).dot(row_angular1));
    }
    if body2.is_dynamic() {
        k = k.safe_add(row_linear2.length_squared().safe_mul(body2.inv_mass));
        k = k.safe_add(body2.inv_world_inertia.transform_vector(row_angular2).dot(row_angular2));
    }
    if k.is_zero() {
        Fix64::ZERO
    } else {
        Fix64::ONE.safe_div(k)
    }
}

/// The solver entries owned by one manifold (spec.md section 4.5: "Each
/// manifold owns a contact manifold constraint that aggregates one
/// `PenetrationConstraint` per contact plus central `SlidingFriction` and
/// `TwistFriction` constraints").
pub struct ManifoldConstraint {
    penetration: Vec<Row>,
    friction: [Row; 2],
    twist: Row,
    friction_coefficient: Fix64,
}

impl ManifoldConstraint {
    /// Pre-step: builds jacobians, effective masses, softness, and biases
    /// from the manifold's current contacts (spec.md section 4.5).
    pub fn prestep(
        manifold: &ContactManifold,
        body1: &RigidBody,
        body2: &RigidBody,
        params: &SolverParameters,
    ) -> Option<Self> {
        if manifold.is_empty() {
            return None;
        }

        let mut penetration = Vec::with_capacity(manifold.contacts.len());
        let mut weighted_center = Vector3::ZERO;
        let mut normal_sum = Vector3::ZERO;
        for contact in &manifold.contacts {
            weighted_center += body1.pose.transform_point(contact.local_anchor_a);
            normal_sum += contact.normal;
        }
        let n = Fix64::from_i32(manifold.contacts.len() as i32);
        weighted_center = weighted_center * Fix64::ONE.safe_div(n);
        let normal = normal_sum.normalize().map(|(u, _)| u).unwrap_or(Vector3::Y);

        for contact in &manifold.contacts {
            let world_a = body1.pose.transform_point(contact.local_anchor_a);
            let world_b = body2.pose.transform_point(contact.local_anchor_b);
            let r1 = world_a - body1.pose.position;
            let r2 = world_b - body2.pose.position;
            let cn = contact.normal;

            let linear1 = -cn;
            let angular1 = -r1.cross(cn);
            let linear2 = cn;
            let angular2 = r2.cross(cn);

            let effective_mass = effective_mass_of(linear1, angular1, linear2, angular2, body1, body2);
            let softness =
                params.softness_factor.safe_mul(effective_mass_recip(effective_mass)).safe_mul(Fix64::ONE.safe_div(params.dt));

            let relative_normal_velocity = linear1.dot(body1.linear_velocity)
                + angular1.dot(body1.angular_velocity)
                + linear2.dot(body2.linear_velocity)
                + angular2.dot(body2.angular_velocity);

            let mut bias = (contact.depth.safe_sub(params.allowed_penetration))
                .max(Fix64::ZERO)
                .safe_mul(params.stiffness)
                .safe_div(params.dt)
                .min(params.max_recovery_speed);

            if manifold.bounciness > Fix64::ZERO
                && (-relative_normal_velocity) > params.restitution_velocity_threshold
            {
                bias = bias.max((-relative_normal_velocity).safe_mul(manifold.bounciness));
            }

            penetration.push(Row {
                linear1,
                angular1,
                linear2,
                angular2,
                effective_mass,
                bias,
                softness,
                accumulated_impulse: contact.normal_impulse,
                min_impulse: Fix64::ZERO,
                max_impulse: Fix64::MAX,
            });
        }

        let (tangent1, tangent2) = normal.orthonormal_basis();
        let r1 = weighted_center - body1.pose.position;
        let r2 = (weighted_center - body2.pose.position) + (body2.pose.position - body1.pose.position);
        let make_friction_row = |tangent: Vector3, warm_impulse: Fix64| {
            let linear1 = -tangent;
            let angular1 = -r1.cross(tangent);
            let linear2 = tangent;
            let angular2 = r2.cross(tangent);
            let effective_mass = effective_mass_of(linear1, angular1, linear2, angular2, body1, body2);
            Row {
                linear1,
                angular1,
                linear2,
                angular2,
                effective_mass,
                bias: Fix64::ZERO,
                softness: Fix64::ZERO,
                accumulated_impulse: warm_impulse,
                min_impulse: Fix64::ZERO,
                max_impulse: Fix64::ZERO,
            }
        };

        let friction = [
            make_friction_row(tangent1, manifold.friction_impulse[0]),
            make_friction_row(tangent2, manifold.friction_impulse[1]),
        ];

        let twist_angular1 = -normal;
        let twist_angular2 = normal;
        let twist_effective_mass = effective_mass_of(Vector3::ZERO, twist_angular1, Vector3::ZERO, twist_angular2, body1, body2);
        let twist = Row {
            linear1: Vector3::ZERO,
            angular1: twist_angular1,
            linear2: Vector3::ZERO,
            angular2: twist_angular2,
            effective_mass: twist_effective_mass,
            bias: Fix64::ZERO,
            softness: Fix64::ZERO,
            accumulated_impulse: manifold.twist_impulse,
            min_impulse: Fix64::ZERO,
            max_impulse: Fix64::ZERO,
        };

        Some(ManifoldConstraint {
            penetration,
            friction,
            twist,
            friction_coefficient: manifold.friction,
        })
    }

    pub fn warm_start(&self, body1: &mut RigidBody, body2: &mut RigidBody) {
        for row in &self.penetration {
            row.warm_start(body1, body2);
        }
        for row in &self.friction {
            row.warm_start(body1, body2);
        }
        self.twist.warm_start(body1, body2);
    }

    /// One velocity-iteration pass: solves penetration rows first, then
    /// recomputes the friction impulse caps from their accumulated normal
    /// impulses (spec.md section 4.5: "impulse cap... for friction,
    /// `mu * sum normal_impulse`"), then solves friction and twist.
    pub fn solve(&mut self, body1: &mut RigidBody, body2: &mut RigidBody) {
        for row in &mut self.penetration {
            row.solve(body1, body2);
        }

        let normal_impulse_sum: Fix64 =
            self.penetration.iter().fold(Fix64::ZERO, |acc, row| acc.safe_add(row.accumulated_impulse));
        let limit = self.friction_coefficient.safe_mul(normal_impulse_sum);
        for row in &mut self.friction {
            row.min_impulse = -limit;
            row.max_impulse = limit;
            row.solve(body1, body2);
        }

        self.twist.min_impulse = -limit;
        self.twist.max_impulse = limit;
        self.twist.solve(body1, body2);
    }

    /// Copies this tick's converged impulses back into the manifold so next
    /// tick's [`ManifoldConstraint::prestep`] can warm-start from them
    /// (spec.md section 4.5). `manifold.contacts` must still be in the same
    /// order it was in when this constraint was built via `prestep`.
    pub fn write_back(&self, manifold: &mut ContactManifold) {
        for (row, contact) in self.penetration.iter().zip(manifold.contacts.iter_mut()) {
            contact.normal_impulse = row.accumulated_impulse;
        }
        manifold.friction_impulse = [self.friction[0].accumulated_impulse, self.friction[1].accumulated_impulse];
        manifold.twist_impulse = self.twist.accumulated_impulse;
    }
}

fn effective_mass_recip(effective_mass: Fix64) -> Fix64 {
    if effective_mass.is_zero() {
        Fix64::ZERO
    } else {
        Fix64::ONE.safe_div(effective_mass)
    }
}

/// Runs one full solver tick over every active manifold constraint,
/// deterministically ordered by `(body1, body2)` handle (spec.md section
/// 4.6: "Ordering within an iteration is deterministic, by island member id
/// then constraint id"), then writes each constraint's converged impulses
/// back into `manifolds` so the next tick can warm-start from them.
pub fn solve_contacts(
    bodies: &mut RigidBodySet,
    manifolds: &mut [ContactManifold],
    params: &SolverParameters,
) {
    let mut order: Vec<usize> = (0..manifolds.len()).collect();
    order.sort_by_key(|&i| (manifolds[i].body_a, manifolds[i].body_b));

    let mut constraints: Vec<Option<(RigidBodyHandle, RigidBodyHandle, ManifoldConstraint)>> =
        Vec::with_capacity(order.len());
    for &i in &order {
        let manifold = &manifolds[i];
        let (body1, body2) = bodies.get2_mut(manifold.body_a, manifold.body_b);
        let entry = match (body1, body2) {
            (Some(b1), Some(b2)) => ManifoldConstraint::prestep(manifold, b1, b2, params)
                .map(|c| (manifold.body_a, manifold.body_b, c)),
            _ => None,
        };
        constraints.push(entry);
    }

    for entry in constraints.iter_mut().flatten() {
        let (h1, h2, constraint) = entry;
        let (body1, body2) = bodies.get2_mut(*h1, *h2);
        if let (Some(b1), Some(b2)) = (body1, body2) {
            constraint.warm_start(b1, b2);
        }
    }

    for _ in 0..params.velocity_iterations {
        for entry in constraints.iter_mut().flatten() {
            let (h1, h2, constraint) = entry;
            let (body1, body2) = bodies.get2_mut(*h1, *h2);
            if let (Some(b1), Some(b2)) = (body1, body2) {
                constraint.solve(b1, b2);
            }
        }
    }

    for (&i, entry) in order.iter().zip(constraints.iter()) {
        if let Some((_, _, constraint)) = entry {
            constraint.write_back(&mut manifolds[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{BodyStatus, RigidBodyBuilder};
    use crate::geometry::{Shape, Sphere};
    use crate::math::{Quaternion, RigidTransform};
    use crate::narrow_phase::NarrowPhaseConfig;

    #[test]
    fn resting_contact_stops_interpenetration_growth() {
        let mut bodies = RigidBodySet::new();
        let shape = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let dynamic = RigidBodyBuilder::dynamic(shape.clone())
            .position(Vector3::new(Fix64::ZERO, Fix64::from_f64(0.9), Fix64::ZERO))
            .linear_velocity(Vector3::new(Fix64::ZERO, Fix64::from_f64(-1.0), Fix64::ZERO))
            .build();
        let mut ground = RigidBodyBuilder::fixed(shape).build();
        ground.status = BodyStatus::Static;

        let a = bodies.insert(dynamic);
        let b = bodies.insert(ground);

        let mut manifold = ContactManifold::new(a, b, Fix64::from_f64(0.5), Fix64::ZERO);
        let config = NarrowPhaseConfig::default();
        let candidate = crate::narrow_phase::RawCandidate {
            point_a: Vector3::new(Fix64::ZERO, Fix64::from_f64(-0.1), Fix64::ZERO),
            point_b: Vector3::new(Fix64::ZERO, Fix64::from_f64(1.0), Fix64::ZERO),
            normal: Vector3::Y,
            depth: Fix64::from_f64(0.1),
        };
        manifold.update(RigidTransform::new(bodies.get(a).unwrap().pose.position, Quaternion::IDENTITY),
            bodies.get(b).unwrap().pose, &config, vec![candidate]);

        let params = SolverParameters::default();
        solve_contacts(&mut bodies, std::slice::from_mut(&mut manifold), &params);

        let after = bodies.get(a).unwrap().linear_velocity.y.to_f64();
        assert!(after > -1.0);
    }
}
