//! Persistent contact manifolds (spec.md section 4.4): per-tick refresh of
//! cached contacts, candidate generation via GJK/EPA, and area-maximizing
//! reduction to at most four contacts per pair.

use arrayvec::ArrayVec;

use crate::dynamics::RigidBodyHandle;
use crate::geometry::{epa, gjk, GjkResult, Shape};
use crate::math::{Fix64, RigidTransform, Vector3};

mod aggregate;
mod analytic;

/// A single point of contact within a manifold (spec.md section 3,
/// `ContactManifold`: "position, normal, penetration depth, and a feature
/// id used to match contacts across frames").
#[derive(Copy, Clone, Debug)]
pub struct Contact {
    pub local_anchor_a: Vector3,
    pub local_anchor_b: Vector3,
    /// World-space contact normal, pointing from body A toward body B.
    pub normal: Vector3,
    pub depth: Fix64,
    /// Stable id used to match this contact with its counterpart next tick,
    /// so the solver can warm-start its accumulated impulse.
    pub feature_id: u64,
    /// Normal impulse accumulated the last time the solver ran, carried
    /// forward across ticks by [`ContactManifold::merge_candidate`] as long
    /// as this contact keeps matching the same feature (spec.md section
    /// 4.5's warm starting).
    pub normal_impulse: Fix64,
}

impl Contact {
    fn world_point_a(&self, pose_a: RigidTransform) -> Vector3 {
        pose_a.transform_point(self.local_anchor_a)
    }

    fn world_point_b(&self, pose_b: RigidTransform) -> Vector3 {
        pose_b.transform_point(self.local_anchor_b)
    }
}

/// Event delivered when a manifold's contact set transitions between empty
/// and non-empty (SPEC_FULL.md supplemented feature, ordered and delivered
/// once per tick after the solver runs -- spec.md section 4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContactEvent {
    Started { body_a: RigidBodyHandle, body_b: RigidBodyHandle },
    Stopped { body_a: RigidBodyHandle, body_b: RigidBodyHandle },
}

/// A persistent bag of up to four contacts for one pair of collidables
/// (spec.md section 3). Created when a pair first overlaps; destroyed when
/// the pair has had zero contacts for a full tick.
#[derive(Clone)]
pub struct ContactManifold {
    pub body_a: RigidBodyHandle,
    pub body_b: RigidBodyHandle,
    pub contacts: ArrayVec<Contact, 4>,
    pub friction: Fix64,
    pub bounciness: Fix64,
    had_contacts_last_tick: bool,
    next_feature_id: u64,
    /// Central friction/twist impulses accumulated last solve, warm-started
    /// the same way as each contact's own [`Contact::normal_impulse`].
    pub friction_impulse: [Fix64; 2],
    pub twist_impulse: Fix64,
}

impl ContactManifold {
    pub fn new(body_a: RigidBodyHandle, body_b: RigidBodyHandle, friction: Fix64, bounciness: Fix64) -> Self {
        ContactManifold {
            body_a,
            body_b,
            contacts: ArrayVec::new(),
            friction,
            bounciness,
            had_contacts_last_tick: false,
            next_feature_id: 0,
            friction_impulse: [Fix64::ZERO; 2],
            twist_impulse: Fix64::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Retransforms cached contacts into world space and drops any whose
    /// local offsets have drifted past `invalidation_length` (projected
    /// into the tangent plane) or whose normal-axis separation exceeds
    /// `max_contact_distance` (spec.md section 4.4, step 1).
    pub fn refresh(
        &mut self,
        pose_a: RigidTransform,
        pose_b: RigidTransform,
        invalidation_length: Fix64,
        max_contact_distance: Fix64,
    ) {
        self.contacts.retain(|contact| {
            let point_a = contact.world_point_a(pose_a);
            let point_b = contact.world_point_b(pose_b);
            let separation_vec = point_b - point_a;
            let separation = separation_vec.dot(contact.normal);
            let tangential = separation_vec - contact.normal * separation;
            tangential.length().unwrap_or(Fix64::ZERO) <= invalidation_length
                && separation <= max_contact_distance
        });
    }

    /// Merges a freshly generated candidate into the manifold (spec.md
    /// section 4.4, step 3): replaces the nearest existing contact if
    /// within `min_separation`, otherwise appends if there is room, else
    /// reduces the resulting five down to the best four.
    pub fn merge_candidate(&mut self, candidate: Contact, min_separation: Fix64) {
        if let Some(existing) = self
            .contacts
            .iter_mut()
            .find(|c| {
                (c.local_anchor_a - candidate.local_anchor_a).length().unwrap_or(Fix64::ZERO) <= min_separation
            })
        {
            existing.normal = candidate.normal;
            existing.depth = candidate.depth;
            existing.local_anchor_a = candidate.local_anchor_a;
            existing.local_anchor_b = candidate.local_anchor_b;
            return;
        }

        if self.contacts.len() < 4 {
            self.contacts.push(candidate);
            return;
        }

        let mut five: Vec<Contact> = self.contacts.iter().copied().collect();
        five.push(candidate);
        self.contacts = reduce_to_four(&five);
    }

    /// Runs the per-tick maintenance pipeline for this manifold (spec.md
    /// section 4.4). `generate` yields fresh candidates in body-A local
    /// space.
    pub fn update(
        &mut self,
        pose_a: RigidTransform,
        pose_b: RigidTransform,
        config: &NarrowPhaseConfig,
        candidates: Vec<RawCandidate>,
    ) {
        self.refresh(pose_a, pose_b, config.contact_invalidation_length, config.maximum_contact_distance);

        for raw in candidates {
            let feature_id = self.next_feature_id;
            self.next_feature_id += 1;
            let contact = Contact {
                local_anchor_a: pose_a.inverse_transform_point(raw.point_a),
                local_anchor_b: pose_b.inverse_transform_point(raw.point_b),
                normal: raw.normal,
                depth: raw.depth,
                feature_id,
                normal_impulse: Fix64::ZERO,
            };
            self.merge_candidate(contact, config.minimum_contact_separation);
        }

        let has_contacts = !self.is_empty();
        self.had_contacts_last_tick = has_contacts;
    }

    pub fn just_started(&self) -> bool {
        !self.had_contacts_last_tick && !self.is_empty()
    }
}

/// A world-space candidate contact before it has been committed into a
/// manifold's local-space storage.
pub struct RawCandidate {
    pub point_a: Vector3,
    pub point_b: Vector3,
    pub normal: Vector3,
    pub depth: Fix64,
}

/// Tunables from spec.md section 6 ("Narrow-phase configuration").
#[derive(Copy, Clone, Debug)]
pub struct NarrowPhaseConfig {
    pub contact_invalidation_length: Fix64,
    pub maximum_contact_distance: Fix64,
    pub minimum_contact_separation: Fix64,
    /// Contacts within this GJK separation of touching are kept even though
    /// the shapes have not yet overlapped, matching each shape's margin.
    pub speculative_contact_distance: Fix64,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        NarrowPhaseConfig {
            contact_invalidation_length: Fix64::from_f64(0.02),
            maximum_contact_distance: Fix64::from_f64(0.02),
            minimum_contact_separation: Fix64::from_f64(0.02),
            speculative_contact_distance: Fix64::from_f64(0.04),
        }
    }
}

/// Candidate generation entry point (spec.md section 4.4, step 2): routes
/// aggregate shapes (`StaticMesh`/`MobileMesh`/`Compound`/`StaticGroup`) to
/// per-child/per-triangle recursion since they have no support function,
/// dispatches analytic fast paths for sphere/sphere, box/sphere, and
/// box/box, and falls back to GJK/EPA for every other convex pair.
pub fn generate_candidates(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Vec<RawCandidate> {
    if let Some(candidates) = aggregate::candidates(shape_a, pose_a, shape_b, pose_b, config) {
        return candidates;
    }

    match (shape_a, shape_b) {
        (Shape::Sphere(sa), Shape::Sphere(sb)) => analytic::sphere_sphere(sa, pose_a, sb, pose_b, config),
        (Shape::Box(ba), Shape::Sphere(sb)) => {
            analytic::box_sphere(ba, pose_a, sb, pose_b, config).into_iter().collect()
        }
        (Shape::Sphere(sa), Shape::Box(bb)) => analytic::box_sphere(bb, pose_b, sa, pose_a, config)
            .into_iter()
            .map(flip_candidate)
            .collect(),
        (Shape::Box(ba), Shape::Box(bb)) => match analytic::box_box(ba, pose_a, bb, pose_b, config) {
            Some(candidates) => candidates,
            None => generate_convex_candidates(shape_a, pose_a, shape_b, pose_b, config),
        },
        _ => generate_convex_candidates(shape_a, pose_a, shape_b, pose_b, config),
    }
}

fn flip_candidate(candidate: RawCandidate) -> RawCandidate {
    RawCandidate { point_a: candidate.point_b, point_b: candidate.point_a, normal: -candidate.normal, depth: candidate.depth }
}

/// Generic convex-convex candidate generation via GJK/EPA (spec.md section
/// 4.4, step 2): the fallback [`generate_candidates`] reaches for once
/// aggregate routing and the analytic fast paths don't apply.
fn generate_convex_candidates(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Vec<RawCandidate> {
    match gjk(shape_a, pose_a, shape_b, pose_b) {
        None => Vec::new(),
        Some(GjkResult::Separated { distance, on_a, on_b }) => {
            if distance <= config.speculative_contact_distance {
                let normal_vec = on_b - on_a;
                let normal = normal_vec.normalize().map(|(n, _)| n).unwrap_or(Vector3::Y);
                vec![RawCandidate { point_a: on_a, point_b: on_b, normal, depth: -distance }]
            } else {
                Vec::new()
            }
        }
        Some(GjkResult::Overlapping { simplex }) => {
            match epa(shape_a, pose_a, shape_b, pose_b, &simplex) {
                Some(info) => vec![RawCandidate {
                    point_a: info.on_a,
                    point_b: info.on_b,
                    normal: info.normal,
                    depth: info.depth,
                }],
                None => Vec::new(),
            }
        }
    }
}

/// Area-maximizing reduction of a five-candidate set down to four (spec.md
/// section 4.4, step 3): keep the deepest contact, then greedily add the
/// three others that maximize the spanned polygon's area.
fn reduce_to_four(contacts: &[Contact]) -> ArrayVec<Contact, 4> {
    if contacts.len() <= 4 {
        let mut out = ArrayVec::new();
        for c in contacts {
            out.push(*c);
        }
        return out;
    }

    let deepest = contacts.iter().enumerate().max_by(|a, b| a.1.depth.cmp(&b.1.depth)).map(|(i, _)| i).unwrap_or(0);

    let mut kept = vec![deepest];
    while kept.len() < 4 {
        let mut best_index = None;
        let mut best_area = Fix64::MIN;
        for (i, _) in contacts.iter().enumerate() {
            if kept.contains(&i) {
                continue;
            }
            let mut trial = kept.clone();
            trial.push(i);
            let area = polygon_area(contacts, &trial);
            if area > best_area {
                best_area = area;
                best_index = Some(i);
            }
        }
        match best_index {
            Some(i) => kept.push(i),
            None => break,
        }
    }

    let mut out = ArrayVec::new();
    for i in kept {
        out.push(contacts[i]);
    }
    out
}

/// Approximate planar area of the polygon formed by the given contact
/// indices' anchor points, via a fan triangulation from the first point.
fn polygon_area(contacts: &[Contact], indices: &[usize]) -> Fix64 {
    if indices.len() < 3 {
        return Fix64::ZERO;
    }
    let origin = contacts[indices[0]].local_anchor_a;
    let mut total = Fix64::ZERO;
    for window in indices[1..].windows(2) {
        let b = contacts[window[0]].local_anchor_a - origin;
        let c = contacts[window[1]].local_anchor_a - origin;
        total = total.safe_add(b.cross(c).length().unwrap_or(Fix64::ZERO));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::RigidBodyHandle;
    use crate::geometry::Sphere;
    use crate::math::Quaternion;

    fn handle(raw: usize) -> RigidBodyHandle {
        RigidBodyHandle::from_raw_parts(raw, 1)
    }

    #[test]
    fn overlapping_spheres_generate_one_candidate() {
        let shape_a = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let pose_a = RigidTransform::new(Vector3::ZERO, Quaternion::IDENTITY);
        let pose_b = RigidTransform::new(Vector3::new(Fix64::from_f64(1.5), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY);

        let config = NarrowPhaseConfig::default();
        let candidates = generate_convex_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].depth.to_f64() > 0.0);
    }

    #[test]
    fn manifold_reports_started_on_first_contact() {
        let mut manifold = ContactManifold::new(handle(0), handle(1), Fix64::from_f64(0.5), Fix64::ZERO);
        let config = NarrowPhaseConfig::default();
        let candidate = RawCandidate { point_a: Vector3::ZERO, point_b: Vector3::X, normal: Vector3::X, depth: Fix64::ONE };
        manifold.update(RigidTransform::IDENTITY, RigidTransform::IDENTITY, &config, vec![candidate]);
        assert!(manifold.just_started());
    }
}
