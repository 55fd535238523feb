//! Simulation islands and the deactivation manager (spec.md section 4.7):
//! union-find merge on constraint addition, deferred BFS-based split on
//! constraint removal, and kinetic-energy-based sleep.

use std::collections::VecDeque;

use crate::data::arena::{Arena, Index};
use crate::math::Fix64;

use super::rigid_body_set::{RigidBodyHandle, RigidBodySet};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct IslandHandle(pub(crate) Index);

/// Group of connected dynamic entities (spec.md section 3, `SimulationIsland`).
pub struct SimulationIsland {
    pub member_count: usize,
    pub candidate_count: usize,
    pub active: bool,
    /// Union-find parent; `None` when this island is its own root.
    parent: Option<IslandHandle>,
}

impl SimulationIsland {
    fn new() -> Self {
        SimulationIsland { member_count: 0, candidate_count: 0, active: true, parent: None }
    }
}

/// Edge in the island graph induced by a manifold or joint (spec.md section 3).
#[derive(Clone, Copy)]
pub struct IslandConnection {
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
    pub slated_for_removal: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SearchTag {
    Unclaimed,
    OwnedByFirst,
    OwnedBySecond,
}

/// Tunables from spec.md section 6 ("Deactivation configuration").
#[derive(Copy, Clone, Debug)]
pub struct DeactivationConfig {
    pub velocity_lower_limit: Fix64,
    pub low_velocity_time_minimum: Fix64,
    pub use_stabilization: bool,
    pub max_deactivation_attempts: usize,
    pub max_split_attempts_fraction: Fix64,
    pub min_split_attempts: usize,
}

impl Default for DeactivationConfig {
    fn default() -> Self {
        DeactivationConfig {
            velocity_lower_limit: Fix64::from_f64(0.26),
            low_velocity_time_minimum: Fix64::ONE,
            use_stabilization: true,
            max_deactivation_attempts: 100,
            max_split_attempts_fraction: Fix64::from_f64(0.01),
            min_split_attempts: 3,
        }
    }
}

impl DeactivationConfig {
    /// Clamps `min_split_attempts` to a floor of 3. Per SPEC_FULL.md's
    /// resolution of the open question on the source's inverted setter: the
    /// observable floor is preserved, but attempts to set it lower are
    /// silently clamped rather than rejected.
    pub fn set_min_split_attempts(&mut self, value: usize) {
        self.min_split_attempts = value.max(3);
    }
}

pub struct IslandManager {
    islands: Arena<SimulationIsland>,
    connections: Vec<IslandConnection>,
    /// Endpoints of connections slated for removal, not vector indices:
    /// `process_removals` uses `swap_remove`, which would silently
    /// invalidate any index still queued behind the one just removed.
    pending_removals: VecDeque<(RigidBodyHandle, RigidBodyHandle)>,
    deactivation_cursor: usize,
}

impl Default for IslandManager {
    fn default() -> Self {
        IslandManager::new()
    }
}

impl IslandManager {
    pub fn new() -> Self {
        IslandManager {
            islands: Arena::new(),
            connections: Vec::new(),
            pending_removals: VecDeque::new(),
            deactivation_cursor: 0,
        }
    }

    /// Ensures `handle` belongs to an island, creating a fresh singleton
    /// island if it has none yet.
    pub fn ensure_member(&mut self, bodies: &mut RigidBodySet, handle: RigidBodyHandle) -> IslandHandle {
        let body = bodies.get_mut(handle).expect("ensure_member: unknown body handle");
        if let Some(island) = body.activity.island {
            return self.find_root(island);
        }
        let island = self.islands.insert(SimulationIsland::new());
        let island = IslandHandle(island);
        self.islands[island.0].member_count = 1;
        body.activity.island = Some(island);
        island
    }

    /// Path-compressing union-find lookup: follows `parent` links to the
    /// root island, flattening visited links along the way.
    pub fn find_root(&mut self, mut handle: IslandHandle) -> IslandHandle {
        let mut path = Vec::new();
        while let Some(parent) = self.islands[handle.0].parent {
            path.push(handle);
            handle = parent;
        }
        for node in path {
            self.islands[node.0].parent = Some(handle);
        }
        handle
    }

    /// Merges the islands of `a` and `b` (smaller into larger, by member
    /// count), the union-by-size strategy named in spec.md section 9.
    /// Kinematic/static endpoints are skipped by the caller before this is
    /// reached.
    pub fn merge(&mut self, a: IslandHandle, b: IslandHandle) -> IslandHandle {
        let root_a = self.find_root(a);
        let root_b = self.find_root(b);
        if root_a == root_b {
            return root_a;
        }

        let count_a = self.islands[root_a.0].member_count;
        let count_b = self.islands[root_b.0].member_count;
        let (bigger, smaller) = if count_a >= count_b { (root_a, root_b) } else { (root_b, root_a) };

        let smaller_members = self.islands[smaller.0].member_count;
        let smaller_candidates = self.islands[smaller.0].candidate_count;
        self.islands[smaller.0].parent = Some(bigger);
        self.islands[bigger.0].member_count += smaller_members;
        self.islands[bigger.0].candidate_count += smaller_candidates;
        self.islands[bigger.0].active = true;
        bigger
    }

    /// Adds a connection (spec.md section 4.7 "merge"), merging the two
    /// endpoints' islands unless either is kinematic/static.
    pub fn add_connection(
        &mut self,
        bodies: &mut RigidBodySet,
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
    ) {
        self.connections.push(IslandConnection { body1, body2, slated_for_removal: false });

        let dynamic1 = bodies.get(body1).map(|b| b.is_dynamic()).unwrap_or(false);
        let dynamic2 = bodies.get(body2).map(|b| b.is_dynamic()).unwrap_or(false);
        if !(dynamic1 && dynamic2) {
            if dynamic1 {
                self.ensure_member(bodies, body1);
            }
            if dynamic2 {
                self.ensure_member(bodies, body2);
            }
            return;
        }

        let island1 = self.ensure_member(bodies, body1);
        let island2 = self.ensure_member(bodies, body2);
        self.merge(island1, island2);
    }

    /// Marks a connection "slated for removal" (spec.md section 4.7
    /// "split"); the actual split work is deferred to `process_removals`.
    pub fn remove_connection(&mut self, body1: RigidBodyHandle, body2: RigidBodyHandle) {
        if let Some(index) = self
            .connections
            .iter()
            .position(|c| (c.body1 == body1 && c.body2 == body2) || (c.body1 == body2 && c.body2 == body1))
        {
            self.connections[index].slated_for_removal = true;
            self.pending_removals.push_back((body1, body2));
        }
    }

    /// Processes a bounded fraction of queued removals (spec.md section
    /// 4.7): for each, a two-way BFS from the connection's two endpoints
    /// decides whether a split is needed.
    pub fn process_removals(&mut self, bodies: &mut RigidBodySet, config: &DeactivationConfig) {
        let total = self.connections.len().max(1);
        let budget = ((Fix64::from_i32(total as i32).safe_mul(config.max_split_attempts_fraction))
            .to_f64()
            .ceil() as usize)
            .max(config.min_split_attempts)
            .min(self.pending_removals.len());

        for _ in 0..budget {
            let (body1, body2) = match self.pending_removals.pop_front() {
                Some(pair) => pair,
                None => break,
            };
            let index = self.connections.iter().position(|c| {
                c.slated_for_removal
                    && ((c.body1 == body1 && c.body2 == body2) || (c.body1 == body2 && c.body2 == body1))
            });
            let Some(index) = index else { continue };
            let connection = self.connections.swap_remove(index);
            self.try_split(bodies, connection.body1, connection.body2);
        }
    }

    /// Two-way breadth-first search outward from `a` and `b`: if one
    /// search exhausts its queue without meeting the other, the isolated
    /// subgraph is given a fresh island (spec.md section 4.7).
    fn try_split(&mut self, bodies: &mut RigidBodySet, a: RigidBodyHandle, b: RigidBodyHandle) {
        use std::collections::HashMap;

        let mut tags: HashMap<RigidBodyHandle, SearchTag> = HashMap::new();
        let mut queue_first = VecDeque::new();
        let mut queue_second = VecDeque::new();
        queue_first.push_back(a);
        queue_second.push_back(b);
        tags.insert(a, SearchTag::OwnedByFirst);
        tags.insert(b, SearchTag::OwnedBySecond);

        let mut met = false;
        while !queue_first.is_empty() || !queue_second.is_empty() {
            if Self::bfs_step(&self.connections, &mut queue_first, &mut tags, SearchTag::OwnedByFirst, SearchTag::OwnedBySecond) {
                met = true;
                break;
            }
            if Self::bfs_step(&self.connections, &mut queue_second, &mut tags, SearchTag::OwnedBySecond, SearchTag::OwnedByFirst) {
                met = true;
                break;
            }
            if queue_first.is_empty() || queue_second.is_empty() {
                break;
            }
        }

        if met {
            return;
        }

        // Whichever search exhausted first owns the isolated subgraph; give
        // its members (the `OwnedByFirst`-or-`OwnedBySecond` tag that did
        // NOT meet the other) a fresh island.
        let isolated_tag = if queue_first.is_empty() { SearchTag::OwnedByFirst } else { SearchTag::OwnedBySecond };
        let isolated: Vec<RigidBodyHandle> =
            tags.iter().filter(|(_, tag)| **tag == isolated_tag).map(|(h, _)| *h).collect();

        if isolated.is_empty() {
            return;
        }

        let fresh = IslandHandle(self.islands.insert(SimulationIsland::new()));
        for handle in &isolated {
            if let Some(body) = bodies.get_mut(*handle) {
                if let Some(old_island) = body.activity.island {
                    let root = self.find_root(old_island);
                    self.islands[root.0].member_count = self.islands[root.0].member_count.saturating_sub(1);
                }
                body.activity.island = Some(fresh);
            }
        }
        self.islands[fresh.0].member_count = isolated.len();
    }

    fn bfs_step(
        connections: &[IslandConnection],
        queue: &mut VecDeque<RigidBodyHandle>,
        tags: &mut std::collections::HashMap<RigidBodyHandle, SearchTag>,
        own_tag: SearchTag,
        other_tag: SearchTag,
    ) -> bool {
        if let Some(current) = queue.pop_front() {
            for connection in connections {
                if connection.slated_for_removal {
                    continue;
                }
                let neighbor = if connection.body1 == current {
                    Some(connection.body2)
                } else if connection.body2 == current {
                    Some(connection.body1)
                } else {
                    None
                };
                if let Some(neighbor) = neighbor {
                    match tags.get(&neighbor) {
                        Some(tag) if *tag == other_tag => return true,
                        Some(_) => {}
                        None => {
                            tags.insert(neighbor, own_tag);
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }
        false
    }

    /// Updates each active dynamic body's deactivation-candidate timer from
    /// its kinetic energy, then deactivates any island whose
    /// `candidate_count == member_count` (spec.md section 4.7). Bounded to
    /// `max_deactivation_attempts` members per tick, rotating the start
    /// index to spread cost.
    pub fn update_deactivation(&mut self, bodies: &mut RigidBodySet, dt: Fix64, config: &DeactivationConfig) {
        let handles: Vec<RigidBodyHandle> = bodies.iter_active_dynamic().map(|(h, _)| h).collect();
        if handles.is_empty() {
            return;
        }

        let attempts = handles.len().min(config.max_deactivation_attempts);
        for offset in 0..attempts {
            let index = (self.deactivation_cursor + offset) % handles.len();
            let handle = handles[index];
            let Some(body) = bodies.get_mut(handle) else { continue };
            let energy = body.kinetic_energy();
            let speed_like = energy.safe_mul(Fix64::TWO).max(Fix64::ZERO);
            let was_candidate = body.activity.is_candidate(config.low_velocity_time_minimum);

            if speed_like < config.velocity_lower_limit.safe_mul(config.velocity_lower_limit) {
                body.activity.low_velocity_time = body.activity.low_velocity_time.safe_add(dt);
            } else {
                body.activity.low_velocity_time = Fix64::ZERO;
            }

            let is_candidate = body.activity.is_candidate(config.low_velocity_time_minimum);
            if let Some(island) = body.activity.island {
                let root = self.find_root(island);
                if is_candidate && !was_candidate {
                    self.islands[root.0].candidate_count += 1;
                } else if !is_candidate && was_candidate {
                    self.islands[root.0].candidate_count =
                        self.islands[root.0].candidate_count.saturating_sub(1);
                }
            }
        }
        self.deactivation_cursor = (self.deactivation_cursor + attempts) % handles.len().max(1);

        let roots: Vec<IslandHandle> = handles
            .iter()
            .filter_map(|h| bodies.get(*h).and_then(|b| b.activity.island))
            .map(|island| self.find_root(island))
            .collect();

        for root in roots {
            let island = &self.islands[root.0];
            if island.active && island.member_count > 0 && island.candidate_count == island.member_count {
                self.islands[root.0].active = false;
                for handle in &handles {
                    if let Some(body) = bodies.get_mut(*handle) {
                        if body.activity.island.map(|i| self.find_root(i)) == Some(root) {
                            body.activity.sleeping = true;
                        }
                    }
                }
            }
        }
    }

    /// Wakes the island containing `handle` (spec.md section 4.7:
    /// "activation is triggered by any impulse application... propagates to
    /// the whole island").
    pub fn wake_island(&mut self, bodies: &mut RigidBodySet, handle: RigidBodyHandle) {
        let Some(body) = bodies.get(handle) else { return };
        let Some(island) = body.activity.island else { return };
        let root = self.find_root(island);
        self.islands[root.0].active = true;
        self.islands[root.0].candidate_count = 0;

        let members: Vec<RigidBodyHandle> = bodies
            .iter_active_dynamic()
            .filter(|(_, b)| b.activity.island.is_some())
            .map(|(h, _)| h)
            .collect();
        for member in members {
            if let Some(body) = bodies.get_mut(member) {
                if body.activity.island.map(|i| i == island || self.find_root(i) == root).unwrap_or(false) {
                    body.wake_up();
                }
            }
        }
    }

    pub fn is_active(&mut self, island: IslandHandle) -> bool {
        let root = self.find_root(island);
        self.islands[root.0].active
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Reclaims empty/orphaned islands in place (spec.md section 4.8):
    /// no data structure rebuild, just removing zero-member roots.
    pub fn reclaim_empty(&mut self) {
        let empties: Vec<Index> = self
            .islands
            .iter()
            .filter(|(_, island)| island.parent.is_none() && island.member_count == 0)
            .map(|(i, _)| i)
            .collect();
        for index in empties {
            self.islands.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{RigidBody, RigidBodyBuilder};
    use crate::geometry::{Shape, Sphere};

    fn body() -> RigidBody {
        RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE })).build()
    }

    #[test]
    fn chain_of_connections_merges_to_one_island() {
        let mut bodies = RigidBodySet::new();
        let mut islands = IslandManager::new();
        let handles: Vec<_> = (0..4).map(|_| bodies.insert(body())).collect();

        for pair in handles.windows(2) {
            islands.add_connection(&mut bodies, pair[0], pair[1]);
        }

        let root0 = islands.ensure_member(&mut bodies, handles[0]);
        for &h in &handles[1..] {
            let root = islands.ensure_member(&mut bodies, h);
            assert_eq!(islands.find_root(root), islands.find_root(root0));
        }
    }

    #[test]
    fn removing_an_edge_eventually_splits_isolated_tail() {
        let mut bodies = RigidBodySet::new();
        let mut islands = IslandManager::new();
        let a = bodies.insert(body());
        let b = bodies.insert(body());
        let c = bodies.insert(body());

        islands.add_connection(&mut bodies, a, b);
        islands.add_connection(&mut bodies, b, c);
        islands.remove_connection(b, c);

        let config = DeactivationConfig::default();
        for _ in 0..8 {
            islands.process_removals(&mut bodies, &config);
        }

        let root_a = islands.find_root(bodies.get(a).unwrap().activity.island.unwrap());
        let root_c = islands.find_root(bodies.get(c).unwrap().activity.island.unwrap());
        assert_ne!(root_a, root_c);
    }

    #[test]
    fn min_split_attempts_floor_is_enforced() {
        let mut config = DeactivationConfig::default();
        config.set_min_split_attempts(1);
        assert_eq!(config.min_split_attempts, 3);
    }
}
