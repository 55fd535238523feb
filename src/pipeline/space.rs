use std::collections::HashMap;

use crate::broad_phase::{BoundingVolumeHierarchy, EntryHandle};
use crate::dynamics::{Joint, JointHandle, JointSet, RigidBody, RigidBodyHandle, RigidBodySet};
use crate::dynamics::island::IslandManager;
use crate::error::{PhysicsError, Result};
use crate::geometry::{gjk, GjkResult, Ray, Shape};
use crate::math::{Fix64, RigidTransform, Vector3};
use crate::narrow_phase::{generate_candidates, ContactManifold};

use super::IntegrationParameters;

/// The phase at which a host-supplied hook runs within one `step` (spec.md
/// section 6: `add_updateable(hook, phase)`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateablePhase {
    BeforeNarrow,
    BeforeSolver,
    BeforeIntegration,
    EndOfStep,
}

/// A host-supplied per-tick callback (spec.md section 6).
pub trait UpdateableHook {
    fn update(&mut self, bodies: &mut RigidBodySet, dt: Fix64);
}

impl<F: FnMut(&mut RigidBodySet, Fix64)> UpdateableHook for F {
    fn update(&mut self, bodies: &mut RigidBodySet, dt: Fix64) {
        self(bodies, dt)
    }
}

/// Result of a ray or convex cast (spec.md section 6).
#[derive(Copy, Clone, Debug)]
pub struct Hit {
    pub body: RigidBodyHandle,
    pub point: Vector3,
    pub normal: Vector3,
    pub toi: Fix64,
}

/// The shape of a volume overlap query (spec.md section 6, `volume_query`).
pub enum VolumeQuery {
    BoundingBox(crate::geometry::BoundingBox),
    Sphere { center: Vector3, radius: Fix64 },
    /// Six half-spaces `{normal, offset}`; a point `p` is inside when
    /// `p.dot(normal) <= offset` for every plane.
    Frustum(Vec<(Vector3, Fix64)>),
}

/// An ordered pair of rigid-body handles naming one narrow-phase manifold.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
struct ManifoldKey(RigidBodyHandle, RigidBodyHandle);

impl ManifoldKey {
    fn new(a: RigidBodyHandle, b: RigidBodyHandle) -> Self {
        if a <= b {
            ManifoldKey(a, b)
        } else {
            ManifoldKey(b, a)
        }
    }
}

/// The top-level simulation aggregate (spec.md section 6, "Space API").
pub struct Space {
    bodies: RigidBodySet,
    joints: JointSet,
    broad_phase: BoundingVolumeHierarchy,
    body_entries: HashMap<RigidBodyHandle, EntryHandle>,
    entry_bodies: HashMap<EntryHandle, RigidBodyHandle>,
    manifolds: HashMap<ManifoldKey, ContactManifold>,
    islands: IslandManager,
    pub parameters: IntegrationParameters,
    hooks: Vec<(UpdateablePhase, Box<dyn UpdateableHook>)>,
    pub contact_events: Vec<crate::narrow_phase::ContactEvent>,
}

impl Default for Space {
    fn default() -> Self {
        Space::new()
    }
}

impl Space {
    pub fn new() -> Self {
        Space {
            bodies: RigidBodySet::new(),
            joints: JointSet::new(),
            broad_phase: BoundingVolumeHierarchy::new(),
            body_entries: HashMap::new(),
            entry_bodies: HashMap::new(),
            manifolds: HashMap::new(),
            islands: IslandManager::new(),
            parameters: IntegrationParameters::default(),
            hooks: Vec::new(),
            contact_events: Vec::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut RigidBodySet {
        &mut self.bodies
    }

    fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        let margin = self.parameters.default_margin;
        let bounding_box = body.world_bounding_box().expanded(margin);
        let handle = self.bodies.insert(body);
        let entry = self.broad_phase.insert(bounding_box, handle.into_raw_parts().0 as u64);
        self.body_entries.insert(handle, entry);
        self.entry_bodies.insert(entry, handle);
        handle
    }

    /// Adds a dynamic or kinematic entity (spec.md section 6, `add_entity`).
    pub fn add_entity(&mut self, body: RigidBody) -> Result<RigidBodyHandle> {
        if body.is_static() {
            return Err(PhysicsError::InvalidArgument("add_entity: body must be dynamic or kinematic"));
        }
        Ok(self.insert_body(body))
    }

    pub fn remove_entity(&mut self, handle: RigidBodyHandle) -> Result<()> {
        self.remove_any(handle)
    }

    /// Adds an immovable collidable (spec.md section 6, `add_static`).
    pub fn add_static(&mut self, body: RigidBody) -> Result<RigidBodyHandle> {
        if !body.is_static() {
            return Err(PhysicsError::InvalidArgument("add_static: body must be static"));
        }
        Ok(self.insert_body(body))
    }

    pub fn remove_static(&mut self, handle: RigidBodyHandle) -> Result<()> {
        self.remove_any(handle)
    }

    fn remove_any(&mut self, handle: RigidBodyHandle) -> Result<()> {
        if !self.bodies.contains(handle) {
            return Err(PhysicsError::MissingEntity);
        }
        if let Some(entry) = self.body_entries.remove(&handle) {
            self.entry_bodies.remove(&entry);
            self.broad_phase.remove(entry);
        }
        self.manifolds.retain(|key, _| key.0 != handle && key.1 != handle);
        self.bodies.remove(handle);
        Ok(())
    }

    pub fn add_joint(&mut self, joint: Joint) -> Result<JointHandle> {
        if !self.bodies.contains(joint.body1) || !self.bodies.contains(joint.body2) {
            return Err(PhysicsError::InvalidArgument("add_joint: both bodies must already be in this Space"));
        }
        self.islands.add_connection(&mut self.bodies, joint.body1, joint.body2);
        Ok(self.joints.insert(joint))
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<()> {
        let joint = self.joints.remove(handle).ok_or(PhysicsError::MissingEntity)?;
        self.islands.remove_connection(joint.body1, joint.body2);
        Ok(())
    }

    pub fn add_updateable(&mut self, phase: UpdateablePhase, hook: Box<dyn UpdateableHook>) {
        self.hooks.push((phase, hook));
    }

    fn run_hooks(&mut self, phase: UpdateablePhase, dt: Fix64) {
        for (hook_phase, hook) in &mut self.hooks {
            if *hook_phase == phase {
                hook.update(&mut self.bodies, dt);
            }
        }
    }

    /// Advances the simulation by one tick (spec.md section 4.6).
    pub fn step(&mut self, dt: Fix64) {
        self.parameters.dt = dt;

        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() && body.activity.sleeping {
                continue;
            }
            if body.is_dynamic() {
                let gravity = body.gravity_override.unwrap_or(self.parameters.gravity);
                body.linear_velocity += gravity * dt;
            }
        }

        for (handle, body) in self.bodies.iter() {
            if let Some(&entry) = self.body_entries.get(&handle) {
                let bounding_box = body.world_bounding_box().expanded(self.parameters.default_margin);
                self.broad_phase.set_bounding_box(entry, bounding_box);
            }
        }
        self.broad_phase.refit();

        self.run_hooks(UpdateablePhase::BeforeNarrow, dt);

        let overlaps = self.broad_phase.compute_overlaps();
        let mut active_keys = std::collections::HashSet::new();
        let narrow_config = self.parameters.narrow_phase_config();
        for overlap in overlaps {
            let Some(&body_a) = self.entry_bodies.get(&overlap.a) else { continue };
            let Some(&body_b) = self.entry_bodies.get(&overlap.b) else { continue };
            let key = ManifoldKey::new(body_a, body_b);
            active_keys.insert(key);

            let (Some(a), Some(b)) = (self.bodies.get(key.0), self.bodies.get(key.1)) else { continue };
            if a.is_static() && b.is_static() {
                continue;
            }
            let candidates = generate_candidates(&a.shape, a.pose, &b.shape, b.pose, &narrow_config);
            let friction = crate::dynamics::Material::combine_kinetic_friction(&a.material, &b.material);
            let bounciness = crate::dynamics::Material::combine_bounciness(&a.material, &b.material);
            let pose_a = a.pose;
            let pose_b = b.pose;

            let manifold = self
                .manifolds
                .entry(key)
                .or_insert_with(|| ContactManifold::new(key.0, key.1, friction, bounciness));
            let was_empty = manifold.is_empty();
            manifold.update(pose_a, pose_b, &narrow_config, candidates);
            if was_empty && !manifold.is_empty() {
                self.contact_events.push(crate::narrow_phase::ContactEvent::Started { body_a: key.0, body_b: key.1 });
                self.islands.add_connection(&mut self.bodies, key.0, key.1);
            }
        }

        let stale: Vec<ManifoldKey> = self.manifolds.keys().filter(|k| !active_keys.contains(k)).copied().collect();
        for key in stale {
            if let Some(manifold) = self.manifolds.get(&key) {
                if manifold.is_empty() {
                    self.manifolds.remove(&key);
                    self.contact_events.push(crate::narrow_phase::ContactEvent::Stopped { body_a: key.0, body_b: key.1 });
                    self.islands.remove_connection(key.0, key.1);
                }
            }
        }

        self.run_hooks(UpdateablePhase::BeforeSolver, dt);

        let solver_params = self.parameters.solver_parameters();
        let mut active_manifolds: Vec<ContactManifold> =
            self.manifolds.values().filter(|m| !m.is_empty()).cloned().collect();
        crate::solver::solve_contacts(&mut self.bodies, &mut active_manifolds, &solver_params);
        for manifold in active_manifolds {
            let key = ManifoldKey::new(manifold.body_a, manifold.body_b);
            if let Some(slot) = self.manifolds.get_mut(&key) {
                slot.contacts = manifold.contacts;
                slot.friction_impulse = manifold.friction_impulse;
                slot.twist_impulse = manifold.twist_impulse;
            }
        }

        for (_, joint) in self.joints.iter() {
            let (body1, body2) = self.bodies.get2_mut(joint.body1, joint.body2);
            if let (Some(b1), Some(b2)) = (body1, body2) {
                let mut constraint = crate::solver::joint::JointConstraint::prestep(joint, b1, b2, &solver_params);
                constraint.warm_start(b1, b2);
                for _ in 0..solver_params.velocity_iterations {
                    constraint.solve(b1, b2);
                }
            }
        }

        self.run_hooks(UpdateablePhase::BeforeIntegration, dt);

        let ccd_starts: Vec<(RigidBodyHandle, Vector3)> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic() && !body.activity.sleeping && body.ccd_enabled)
            .map(|(handle, body)| (handle, body.pose.position))
            .collect();

        for (_, body) in self.bodies.iter_mut() {
            if body.is_static() || (body.is_dynamic() && body.activity.sleeping) {
                continue;
            }
            body.integrate_pose(dt);
            body.apply_damping(dt);
        }

        for (handle, start_position) in ccd_starts {
            self.apply_ccd(handle, start_position);
        }

        self.islands.update_deactivation(&mut self.bodies, dt, &self.parameters.deactivation_config());
        self.islands.process_removals(&mut self.bodies, &self.parameters.deactivation_config());
        self.islands.reclaim_empty();

        self.run_hooks(UpdateablePhase::EndOfStep, dt);
    }

    /// Continuous collision sub-step for bodies with `ccd_enabled` (spec.md
    /// section 4.6, step 4c): "ask every pair this body participates in to
    /// compute a time-of-impact in `[0,1]`; translate by `v · dt · min_toi`."
    /// Reuses [`Space::convex_cast`]'s bisection-over-GJK-overlap approach
    /// rather than true conservative advancement, swept from this tick's
    /// pre-integration position to its post-integration one; pairs already
    /// overlapping at the start of the sweep are skipped so a CCD body
    /// resting in contact does not get frozen in place every tick.
    fn apply_ccd(&mut self, handle: RigidBodyHandle, start_position: Vector3) {
        const ITERATIONS: u32 = 24;

        let Some(body) = self.bodies.get(handle) else { return };
        let end_position = body.pose.position;
        let sweep = end_position - start_position;
        if sweep.length_squared() <= Fix64::ZERO {
            return;
        }
        let shape = body.shape.clone();
        let orientation = body.pose.orientation;
        let pose_at = |t: Fix64| RigidTransform::new(start_position + sweep * t, orientation);

        let query_box = shape.local_bounding_box(pose_at(Fix64::ZERO)).merge(shape.local_bounding_box(pose_at(Fix64::ONE)));
        let mut min_toi = Fix64::ONE;

        for candidate in self.broad_phase.query_bounding_box(query_box) {
            let Some(&other_handle) = self.entry_bodies.get(&candidate) else { continue };
            if other_handle == handle {
                continue;
            }
            let Some(other) = self.bodies.get(other_handle) else { continue };

            let overlapping_at = |t: Fix64| {
                gjk(&shape, pose_at(t), &other.shape, other.pose)
                    .map(|r| matches!(r, GjkResult::Overlapping { .. }))
                    .unwrap_or(false)
            };
            if overlapping_at(Fix64::ZERO) || !overlapping_at(Fix64::ONE) {
                continue;
            }

            let mut lo = Fix64::ZERO;
            let mut hi = Fix64::ONE;
            for _ in 0..ITERATIONS {
                let mid = (lo + hi) * Fix64::HALF;
                if overlapping_at(mid) {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            min_toi = min_toi.min(hi);
        }

        if min_toi < Fix64::ONE {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.pose.position = start_position + sweep * min_toi;
                body.recompute_world_inertia();
            }
        }
    }

    /// Casts a ray through the broad phase, returning the nearest entity
    /// hit for which `filter` returns `true` (spec.md section 6).
    pub fn ray_cast(&self, ray: Ray, max_t: Fix64, filter: impl Fn(RigidBodyHandle) -> bool) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        for candidate in self.broad_phase.query_bounding_box(crate::geometry::BoundingBox::new(
            ray.origin.min(ray.point_at(max_t)) - Vector3::splat(self.parameters.default_margin),
            ray.origin.max(ray.point_at(max_t)) + Vector3::splat(self.parameters.default_margin),
        )) {
            let Some(&handle) = self.entry_bodies.get(&candidate) else { continue };
            if !filter(handle) {
                continue;
            }
            let Some(body) = self.bodies.get(handle) else { continue };
            let local_origin = body.pose.inverse_transform_point(ray.origin);
            let local_dir = body.pose.orientation.conjugate().rotate(ray.direction);
            let local_ray = Ray::new(local_origin, local_dir);
            let limit = best.as_ref().map(|h| h.toi).unwrap_or(max_t);
            if let Some(hit) = body.shape.ray_test(&local_ray, limit) {
                let world_point = body.pose.transform_point(hit.point);
                let world_normal = body.pose.orientation.rotate(hit.normal);
                if best.as_ref().map(|b| hit.t < b.toi).unwrap_or(true) {
                    best = Some(Hit { body: handle, point: world_point, normal: world_normal, toi: hit.t });
                }
            }
        }
        best
    }

    /// Sweeps `shape` from `start_transform` along `sweep`, returning the
    /// first body it would hit (spec.md section 6, `convex_cast`). Uses
    /// bisection over GJK overlap tests rather than true conservative
    /// advancement, since every candidate body is re-tested exactly a
    /// handful of times per query.
    pub fn convex_cast(
        &self,
        shape: &Shape,
        start_transform: RigidTransform,
        sweep: Vector3,
        filter: impl Fn(RigidBodyHandle) -> bool,
    ) -> Option<Hit> {
        const ITERATIONS: u32 = 24;
        let mut best: Option<Hit> = None;

        let query_box = shape
            .local_bounding_box(start_transform)
            .merge(shape.local_bounding_box(RigidTransform::new(start_transform.position + sweep, start_transform.orientation)));

        for candidate in self.broad_phase.query_bounding_box(query_box) {
            let Some(&handle) = self.entry_bodies.get(&candidate) else { continue };
            if !filter(handle) {
                continue;
            }
            let Some(body) = self.bodies.get(handle) else { continue };

            let pose_at = |t: Fix64| RigidTransform::new(start_transform.position + sweep * t, start_transform.orientation);

            if gjk(shape, pose_at(Fix64::ONE), &body.shape, body.pose).map(|r| matches!(r, GjkResult::Overlapping { .. })).unwrap_or(false) {
                let mut lo = Fix64::ZERO;
                let mut hi = Fix64::ONE;
                for _ in 0..ITERATIONS {
                    let mid = (lo + hi) * Fix64::HALF;
                    let overlapping = gjk(shape, pose_at(mid), &body.shape, body.pose)
                        .map(|r| matches!(r, GjkResult::Overlapping { .. }))
                        .unwrap_or(false);
                    if overlapping {
                        hi = mid;
                    } else {
                        lo = mid;
                    }
                }
                if best.as_ref().map(|b| hi < b.toi).unwrap_or(true) {
                    best = Some(Hit {
                        body: handle,
                        point: pose_at(hi).position,
                        normal: Vector3::ZERO,
                        toi: hi,
                    });
                }
            }
        }

        best
    }

    /// Every body overlapping `query` (spec.md section 6, `volume_query`).
    pub fn volume_query(&self, query: VolumeQuery) -> Vec<RigidBodyHandle> {
        let candidates = match &query {
            VolumeQuery::BoundingBox(bb) => self.broad_phase.query_bounding_box(*bb),
            VolumeQuery::Sphere { center, radius } => self.broad_phase.query_sphere(*center, *radius),
            VolumeQuery::Frustum(planes) => self.frustum_candidates(planes),
        };
        candidates.into_iter().filter_map(|c| self.entry_bodies.get(&c).copied()).collect()
    }

    fn frustum_candidates(&self, planes: &[(Vector3, Fix64)]) -> Vec<EntryHandle> {
        self.body_entries
            .iter()
            .filter(|(handle, _)| {
                self.bodies.get(**handle).map(|body| {
                    let center = body.pose.position;
                    planes.iter().all(|(normal, offset)| center.dot(*normal) <= *offset)
                }).unwrap_or(false)
            })
            .map(|(_, entry)| *entry)
            .collect()
    }
}
