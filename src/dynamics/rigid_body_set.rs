use crate::data::arena::{Arena, Index};

use super::activity::RigidBodyChanges;
use super::rigid_body::RigidBody;

/// The unique, stable handle of a rigid body added to a `RigidBodySet`
/// (spec.md section 6, "the entity's `instance_id`... is the stable
/// identity" -- the handle additionally guards against the ABA problem via
/// the arena's generation counter).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RigidBodyHandle(pub(crate) Index);

impl RigidBodyHandle {
    pub fn into_raw_parts(self) -> (usize, u64) {
        self.0.into_raw_parts()
    }

    pub fn from_raw_parts(index: usize, generation: u64) -> Self {
        RigidBodyHandle(Index::from_raw_parts(index, generation))
    }
}

impl PartialOrd for RigidBodyHandle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RigidBodyHandle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// An ordered pair of rigid body handles (used as a manifold/connection key).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BodyPair {
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
}

impl BodyPair {
    /// Builds a pair in canonical (ascending-handle) order, so the same
    /// unordered pair always hashes and compares identically.
    pub fn new(a: RigidBodyHandle, b: RigidBodyHandle) -> Self {
        if a <= b {
            BodyPair { body1: a, body2: b }
        } else {
            BodyPair { body1: b, body2: a }
        }
    }
}

/// Owning store of every rigid body in a `Space`, with the active-set
/// bookkeeping the solver and islands iterate over (spec.md section 3,
/// `Entity`: "owned by a `Space`; destroyed by explicit removal").
#[derive(Clone)]
pub struct RigidBodySet {
    pub(crate) bodies: Arena<RigidBody>,
    pub(crate) active_dynamic_set: Vec<RigidBodyHandle>,
    pub(crate) active_kinematic_set: Vec<RigidBodyHandle>,
    pub(crate) modified_bodies: Vec<RigidBodyHandle>,
    next_instance_id: u64,
}

impl Default for RigidBodySet {
    fn default() -> Self {
        RigidBodySet::new()
    }
}

impl RigidBodySet {
    pub fn new() -> Self {
        RigidBodySet {
            bodies: Arena::new(),
            active_dynamic_set: Vec::new(),
            active_kinematic_set: Vec::new(),
            modified_bodies: Vec::new(),
            next_instance_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle.0)
    }

    pub fn insert(&mut self, mut body: RigidBody) -> RigidBodyHandle {
        body.reset_internal_references();
        body.changes = RigidBodyChanges::all();
        body.instance_id = self.next_instance_id;
        self.next_instance_id += 1;

        let handle = RigidBodyHandle(self.bodies.insert(body));
        self.modified_bodies.push(handle);

        let body = &mut self.bodies[handle.0];
        if body.is_kinematic() {
            body.active_set_id = self.active_kinematic_set.len();
            self.active_kinematic_set.push(handle);
        } else if body.is_dynamic() {
            body.active_set_id = self.active_dynamic_set.len();
            self.active_dynamic_set.push(handle);
        }

        handle
    }

    pub fn remove(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(handle.0)?;

        for active_set in [&mut self.active_dynamic_set, &mut self.active_kinematic_set] {
            if active_set.get(body.active_set_id) == Some(&handle) {
                active_set.swap_remove(body.active_set_id);
                if let Some(&replacement) = active_set.get(body.active_set_id) {
                    self.bodies[replacement.0].active_set_id = body.active_set_id;
                }
            }
        }

        Some(body)
    }

    pub fn get(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        let body = self.bodies.get_mut(handle.0)?;
        if !body.changes.contains(RigidBodyChanges::MODIFIED) {
            body.changes |= RigidBodyChanges::MODIFIED;
            self.modified_bodies.push(handle);
        }
        Some(body)
    }

    pub(crate) fn get2_mut(
        &mut self,
        a: RigidBodyHandle,
        b: RigidBodyHandle,
    ) -> (Option<&mut RigidBody>, Option<&mut RigidBody>) {
        self.bodies.get2_mut(a.0, b.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RigidBodyHandle, &RigidBody)> {
        self.bodies.iter().map(|(i, b)| (RigidBodyHandle(i), b))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RigidBodyHandle, &mut RigidBody)> {
        self.bodies.iter_mut().map(|(i, b)| (RigidBodyHandle(i), b))
    }

    pub fn iter_active_dynamic(&self) -> impl Iterator<Item = (RigidBodyHandle, &RigidBody)> {
        let bodies = &self.bodies;
        self.active_dynamic_set.iter().filter_map(move |h| Some((*h, bodies.get(h.0)?)))
    }

    pub fn iter_active_kinematic(&self) -> impl Iterator<Item = (RigidBodyHandle, &RigidBody)> {
        let bodies = &self.bodies;
        self.active_kinematic_set.iter().filter_map(move |h| Some((*h, bodies.get(h.0)?)))
    }

    pub fn wake_up(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle.0) {
            if body.is_dynamic() {
                body.wake_up();
            }
        }
    }

    pub fn clear_modified(&mut self) {
        for handle in self.modified_bodies.drain(..) {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                body.changes = RigidBodyChanges::empty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::builder::RigidBodyBuilder;
    use crate::geometry::{Shape, Sphere};
    use crate::math::Fix64;

    fn sphere_body() -> RigidBody {
        RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE })).build()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut set = RigidBodySet::new();
        let handle = set.insert(sphere_body());
        assert!(set.get(handle).is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_clears_active_set_membership() {
        let mut set = RigidBodySet::new();
        let a = set.insert(sphere_body());
        let b = set.insert(sphere_body());
        set.remove(a);
        assert!(set.get(a).is_none());
        assert!(set.get(b).is_some());
        assert_eq!(set.active_dynamic_set.len(), 1);
    }

    #[test]
    fn body_pair_is_order_independent() {
        let mut set = RigidBodySet::new();
        let a = set.insert(sphere_body());
        let b = set.insert(sphere_body());
        assert_eq!(BodyPair::new(a, b), BodyPair::new(b, a));
    }
}
