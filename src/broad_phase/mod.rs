//! Incremental bounding-volume hierarchy broad phase (spec.md section 4.3):
//! refit and overlap-emit passes each tick, surface-area-heuristic
//! insertion, and boundary-guided removal.

mod grid;

use std::collections::HashMap;

use crate::data::arena::{Arena, Index};
use crate::geometry::{BoundingBox, Ray, RayHit};
use crate::math::{Fix64, Vector3};

pub use grid::{Grid2DSortAndSweep, GridEntryHandle};

/// A node's bounding box is allowed to grow to this multiple of its cached
/// "reasonable volume" before the subtree is revalidated (spec.md section
/// 4.3, "refit").
const REVALIDATION_GROWTH_FACTOR: f64 = 2.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntryHandle(pub(crate) Index);

struct Entry {
    bounding_box: BoundingBox,
    owner: u64,
    node: Index,
}

struct Node {
    bounding_box: BoundingBox,
    parent: Option<Index>,
    /// `Some` for a leaf; the entry this node represents.
    entry: Option<Index>,
    /// `Some` for an internal node; its two children.
    children: Option<(Index, Index)>,
    reasonable_volume: Fix64,
}

impl Node {
    fn leaf(bounding_box: BoundingBox, entry: Index, parent: Option<Index>) -> Self {
        Node { bounding_box, parent, entry: Some(entry), children: None, reasonable_volume: bounding_box.volume() }
    }

    fn is_leaf(&self) -> bool {
        self.entry.is_some()
    }
}

/// An unordered pair of overlapping entries (spec.md section 3,
/// `Overlap (NodePair)`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Overlap {
    pub a: EntryHandle,
    pub b: EntryHandle,
}

/// The incremental BVH broad phase.
pub struct BoundingVolumeHierarchy {
    entries: Arena<Entry>,
    nodes: Arena<Node>,
    root: Option<Index>,
}

impl Default for BoundingVolumeHierarchy {
    fn default() -> Self {
        BoundingVolumeHierarchy::new()
    }
}

impl BoundingVolumeHierarchy {
    pub fn new() -> Self {
        BoundingVolumeHierarchy { entries: Arena::new(), nodes: Arena::new(), root: None }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn owner(&self, handle: EntryHandle) -> Option<u64> {
        self.entries.get(handle.0).map(|e| e.owner)
    }

    pub fn bounding_box(&self, handle: EntryHandle) -> Option<BoundingBox> {
        self.entries.get(handle.0).map(|e| e.bounding_box)
    }

    /// Inserts a new leaf, descending from the root and at each internal
    /// node choosing the child whose box would expand the least (spec.md
    /// section 4.3, "Add/remove").
    pub fn insert(&mut self, bounding_box: BoundingBox, owner: u64) -> EntryHandle {
        let entry_index = self.entries.insert(Entry { bounding_box, owner, node: Index::from_raw_parts(0, 0) });
        let leaf = self.nodes.insert(Node::leaf(bounding_box, entry_index, None));
        self.entries[entry_index].node = leaf;

        match self.root {
            None => self.root = Some(leaf),
            Some(root) => {
                let sibling = self.pick_insertion_sibling(root, bounding_box);
                self.insert_sibling(sibling, leaf);
            }
        }

        EntryHandle(entry_index)
    }

    fn pick_insertion_sibling(&self, mut node: Index, bounding_box: BoundingBox) -> Index {
        loop {
            let current = &self.nodes[node];
            match current.children {
                None => return node,
                Some((left, right)) => {
                    let cost_left = self.nodes[left].bounding_box.merge(bounding_box).surface_area();
                    let cost_right = self.nodes[right].bounding_box.merge(bounding_box).surface_area();
                    node = if cost_left.to_f64() <= cost_right.to_f64() { left } else { right };
                }
            }
        }
    }

    fn insert_sibling(&mut self, sibling: Index, leaf: Index) {
        let old_parent = self.nodes[sibling].parent;
        let merged = self.nodes[sibling].bounding_box.merge(self.nodes[leaf].bounding_box);

        let new_internal = self.nodes.insert(Node {
            bounding_box: merged,
            parent: old_parent,
            entry: None,
            children: Some((sibling, leaf)),
            reasonable_volume: merged.volume(),
        });

        self.nodes[sibling].parent = Some(new_internal);
        self.nodes[leaf].parent = Some(new_internal);

        match old_parent {
            None => self.root = Some(new_internal),
            Some(parent) => {
                let (left, right) = self.nodes[parent].children.expect("parent of a leaf is internal");
                self.nodes[parent].children = Some(if left == sibling {
                    (new_internal, right)
                } else {
                    (left, new_internal)
                });
            }
        }

        self.refit_ancestors(new_internal);
    }

    /// Removes an entry, splicing its sibling up into the grandparent's slot
    /// (spec.md section 4.3, "Add/remove"). Always uses the boundary-guided
    /// path since the arena already gives us a direct node reference; the
    /// brute-force fallback the source needs for force-moved entries is
    /// unnecessary here.
    pub fn remove(&mut self, handle: EntryHandle) -> Option<()> {
        let entry = self.entries.remove(handle.0)?;
        let leaf = entry.node;
        let parent = self.nodes[leaf].parent;
        self.nodes.remove(leaf);

        match parent {
            None => self.root = None,
            Some(parent) => {
                let (left, right) = self.nodes[parent].children.expect("parent of a leaf is internal");
                let sibling = if left == leaf { right } else { left };
                let grandparent = self.nodes[parent].parent;
                self.nodes[sibling].parent = grandparent;
                self.nodes.remove(parent);

                match grandparent {
                    None => self.root = Some(sibling),
                    Some(grandparent) => {
                        let (gleft, gright) =
                            self.nodes[grandparent].children.expect("grandparent is internal");
                        self.nodes[grandparent].children = Some(if gleft == parent {
                            (sibling, gright)
                        } else {
                            (gleft, sibling)
                        });
                        self.refit_ancestors(grandparent);
                    }
                }
            }
        }

        Some(())
    }

    /// Updates an entry's bounding box, re-inserting it if it no longer fits
    /// inside its current leaf's box by more than the margin already baked
    /// into `bounding_box`.
    pub fn set_bounding_box(&mut self, handle: EntryHandle, bounding_box: BoundingBox) {
        let Some(entry) = self.entries.get_mut(handle.0) else { return };
        entry.bounding_box = bounding_box;
        let leaf = entry.node;
        if self.nodes[leaf].bounding_box.contains(bounding_box) {
            return;
        }
        self.nodes[leaf].bounding_box = bounding_box;
        let parent = self.nodes[leaf].parent;
        self.remove_leaf_link(leaf);
        match parent {
            None => self.root = Some(leaf),
            Some(_) => {
                let sibling = match self.root {
                    Some(root) => self.pick_insertion_sibling(root, bounding_box),
                    None => leaf,
                };
                if sibling != leaf {
                    self.insert_sibling(sibling, leaf);
                } else {
                    self.root = Some(leaf);
                }
            }
        }
    }

    /// Detaches `leaf` from its parent without deleting it, splicing the
    /// sibling up (used by `set_bounding_box` before re-inserting).
    fn remove_leaf_link(&mut self, leaf: Index) {
        let parent = match self.nodes[leaf].parent {
            Some(p) => p,
            None => return,
        };
        let (left, right) = self.nodes[parent].children.expect("parent of a leaf is internal");
        let sibling = if left == leaf { right } else { left };
        let grandparent = self.nodes[parent].parent;
        self.nodes[sibling].parent = grandparent;
        self.nodes[leaf].parent = None;
        self.nodes.remove(parent);

        match grandparent {
            None => self.root = Some(sibling),
            Some(grandparent) => {
                let (gleft, gright) = self.nodes[grandparent].children.expect("grandparent is internal");
                self.nodes[grandparent].children =
                    Some(if gleft == parent { (sibling, gright) } else { (gleft, sibling) });
                self.refit_ancestors(grandparent);
            }
        }
    }

    fn refit_ancestors(&mut self, mut node: Index) {
        loop {
            let (left, right) = match self.nodes[node].children {
                Some(pair) => pair,
                None => break,
            };
            let merged = self.nodes[left].bounding_box.merge(self.nodes[right].bounding_box);
            self.nodes[node].bounding_box = merged;
            match self.nodes[node].parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
    }

    /// Bottom-up refit pass (spec.md section 4.3, "Refit"): recomputes
    /// every internal box, then revalidates (rebuilds via greedy SAH
    /// reinsertion of its leaves) any subtree whose volume has grown past
    /// `REVALIDATION_GROWTH_FACTOR` times its cached "reasonable volume".
    pub fn refit(&mut self) {
        let Some(root) = self.root else { return };
        let mut order = Vec::new();
        Self::post_order(&self.nodes, root, &mut order);

        // Bounding boxes are merged bottom-up first and candidates are only
        // rebuilt afterward: `order` lists descendants before ancestors, and
        // `rebuild_subtree` frees node indices, so mutating while `order`
        // still has unvisited stale indices ahead of it would panic.
        let mut to_rebuild = Vec::new();
        for &node in &order {
            if self.nodes[node].is_leaf() {
                continue;
            }
            let (left, right) = self.nodes[node].children.expect("internal node has children");
            let merged = self.nodes[left].bounding_box.merge(self.nodes[right].bounding_box);
            self.nodes[node].bounding_box = merged;

            let grown = merged.volume().to_f64();
            let reasonable = self.nodes[node].reasonable_volume.to_f64().max(1e-9);
            if grown > reasonable * REVALIDATION_GROWTH_FACTOR {
                to_rebuild.push(node);
            }
        }

        for node in to_rebuild {
            self.rebuild_subtree(node);
        }
    }

    /// Rebuilds the subtree rooted at `node` from scratch: collects its
    /// leaves, discards its internal structure, and greedily re-inserts each
    /// leaf with the same nearest-sibling SAH cost used by `insert` (spec.md
    /// section 4.3, "Refit"). `node`'s own index is freed as part of this;
    /// the new local root is spliced into the slot `node` used to occupy.
    fn rebuild_subtree(&mut self, node: Index) {
        if self.nodes[node].is_leaf() {
            return;
        }
        let parent = self.nodes[node].parent;

        let mut leaves = Vec::new();
        Self::collect_leaves(&self.nodes, node, &mut leaves);
        let mut internals = Vec::new();
        Self::collect_internals(&self.nodes, node, &mut internals);
        for internal in internals {
            self.nodes.remove(internal);
        }

        let mut local_root = leaves[0];
        self.nodes[local_root].parent = None;
        for &leaf in &leaves[1..] {
            self.nodes[leaf].parent = None;
            let sibling = self.pick_insertion_sibling(local_root, self.nodes[leaf].bounding_box);
            local_root = self.local_insert_sibling(sibling, leaf);
        }

        self.nodes[local_root].parent = parent;
        match parent {
            None => self.root = Some(local_root),
            Some(parent_index) => {
                let (left, right) =
                    self.nodes[parent_index].children.expect("parent of a rebuilt subtree is internal");
                self.nodes[parent_index].children =
                    Some(if left == node { (local_root, right) } else { (left, local_root) });
            }
        }
        self.refit_ancestors(local_root);
    }

    /// Merges `sibling` and `leaf` under a fresh internal node, entirely
    /// within a subtree being rebuilt: unlike `insert_sibling`, this never
    /// touches `self.root` or an outer parent's children, since the caller
    /// splices the final local root into place itself.
    fn local_insert_sibling(&mut self, sibling: Index, leaf: Index) -> Index {
        let merged = self.nodes[sibling].bounding_box.merge(self.nodes[leaf].bounding_box);
        let new_internal = self.nodes.insert(Node {
            bounding_box: merged,
            parent: None,
            entry: None,
            children: Some((sibling, leaf)),
            reasonable_volume: merged.volume(),
        });
        self.nodes[sibling].parent = Some(new_internal);
        self.nodes[leaf].parent = Some(new_internal);
        new_internal
    }

    fn collect_leaves(nodes: &Arena<Node>, node: Index, out: &mut Vec<Index>) {
        match nodes[node].children {
            Some((left, right)) => {
                Self::collect_leaves(nodes, left, out);
                Self::collect_leaves(nodes, right, out);
            }
            None => out.push(node),
        }
    }

    fn collect_internals(nodes: &Arena<Node>, node: Index, out: &mut Vec<Index>) {
        if let Some((left, right)) = nodes[node].children {
            Self::collect_internals(nodes, left, out);
            Self::collect_internals(nodes, right, out);
            out.push(node);
        }
    }

    fn post_order(nodes: &Arena<Node>, node: Index, out: &mut Vec<Index>) {
        if let Some((left, right)) = nodes[node].children {
            Self::post_order(nodes, left, out);
            Self::post_order(nodes, right, out);
        }
        out.push(node);
    }

    /// Pairwise descent emitting every leaf-leaf overlap (spec.md section
    /// 4.3, "Overlap emit").
    pub fn compute_overlaps(&self) -> Vec<Overlap> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.descend_pairs(root, root, &mut out);
        }
        out
    }

    fn descend_pairs(&self, a: Index, b: Index, out: &mut Vec<Overlap>) {
        if !self.nodes[a].bounding_box.intersects(self.nodes[b].bounding_box) {
            return;
        }
        match (self.nodes[a].children, self.nodes[b].children) {
            (None, None) => {
                if a != b {
                    let ea = self.nodes[a].entry.unwrap();
                    let eb = self.nodes[b].entry.unwrap();
                    if ea != eb {
                        out.push(Overlap { a: EntryHandle(ea.min(eb)), b: EntryHandle(ea.max(eb)) });
                    }
                }
            }
            (Some((l, r)), None) => {
                self.descend_pairs(l, b, out);
                self.descend_pairs(r, b, out);
            }
            (None, Some((l, r))) => {
                self.descend_pairs(a, l, out);
                self.descend_pairs(a, r, out);
            }
            (Some((al, ar)), Some((bl, br))) => {
                if a == b {
                    self.descend_pairs(al, al, out);
                    self.descend_pairs(ar, ar, out);
                    self.descend_pairs(al, ar, out);
                } else {
                    self.descend_pairs(al, bl, out);
                    self.descend_pairs(al, br, out);
                    self.descend_pairs(ar, bl, out);
                    self.descend_pairs(ar, br, out);
                }
            }
        }
    }

    /// Fans the overlap-emit pass out across the current rayon thread pool
    /// by splitting on the root's two children (spec.md section 4.3,
    /// "Multithreaded variant"), falling back to the single-threaded pass
    /// below the fan-out level and near the root.
    #[cfg(feature = "parallel")]
    pub fn compute_overlaps_parallel(&self) -> Vec<Overlap> {
        use rayon::prelude::*;

        let Some(root) = self.root else { return Vec::new() };
        let Some((left, right)) = self.nodes[root].children else {
            return self.compute_overlaps();
        };

        let mut results: Vec<Vec<Overlap>> = [left, right]
            .into_par_iter()
            .map(|child| {
                let mut out = Vec::new();
                self.descend_pairs(child, child, &mut out);
                out
            })
            .collect();

        let mut cross = Vec::new();
        self.descend_pairs(left, right, &mut cross);
        results.push(cross);
        results.into_iter().flatten().collect()
    }

    /// Descends the tree with a slab test at each node, returning the
    /// nearest hit (spec.md section 4.3, "Queries").
    pub fn ray_cast(&self, ray: Ray, max_t: Fix64) -> Option<(EntryHandle, RayHit)> {
        let root = self.root?;
        let mut best: Option<(EntryHandle, RayHit)> = None;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let limit = best.as_ref().map(|(_, hit)| hit.t).unwrap_or(max_t);
            if !Self::ray_hits_box(ray, self.nodes[node].bounding_box, limit) {
                continue;
            }
            match self.nodes[node].children {
                Some((l, r)) => {
                    stack.push(l);
                    stack.push(r);
                }
                None => {
                    let entry_index = self.nodes[node].entry.unwrap();
                    let handle = EntryHandle(entry_index);
                    // Broad-phase leaves only carry a bounding box; the exact
                    // hit against the underlying shape is left to the caller
                    // (narrow phase), which re-tests candidates it receives.
                    if let Some(t) = Self::ray_box_t(ray, self.nodes[node].bounding_box, limit) {
                        let hit = RayHit { t, point: ray.point_at(t), normal: Vector3::ZERO };
                        if best.as_ref().map(|(_, b)| t < b.t).unwrap_or(true) {
                            best = Some((handle, hit));
                        }
                    }
                }
            }
        }
        best
    }

    fn ray_hits_box(ray: Ray, bounding_box: BoundingBox, max_t: Fix64) -> bool {
        Self::ray_box_t(ray, bounding_box, max_t).is_some()
    }

    fn ray_box_t(ray: Ray, bounding_box: BoundingBox, max_t: Fix64) -> Option<Fix64> {
        let mut t_min = Fix64::ZERO;
        let mut t_max = max_t;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let min = bounding_box.min[axis];
            let max = bounding_box.max[axis];
            if dir.is_zero() {
                if origin < min || origin > max {
                    return None;
                }
                continue;
            }
            let inv_dir = Fix64::ONE.safe_div(dir);
            let mut t1 = min.safe_sub(origin).safe_mul(inv_dir);
            let mut t2 = max.safe_sub(origin).safe_mul(inv_dir);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }

    /// Every entry whose box intersects `query`.
    pub fn query_bounding_box(&self, query: BoundingBox) -> Vec<EntryHandle> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.query_box_recurse(root, query, &mut out);
        }
        out
    }

    fn query_box_recurse(&self, node: Index, query: BoundingBox, out: &mut Vec<EntryHandle>) {
        if !self.nodes[node].bounding_box.intersects(query) {
            return;
        }
        match self.nodes[node].children {
            Some((l, r)) => {
                self.query_box_recurse(l, query, out);
                self.query_box_recurse(r, query, out);
            }
            None => out.push(EntryHandle(self.nodes[node].entry.unwrap())),
        }
    }

    /// Every entry whose box intersects a sphere (spec.md section 4.3,
    /// "Queries"): a bounding-box query narrows candidates, then each is
    /// tested against the sphere exactly.
    pub fn query_sphere(&self, center: Vector3, radius: Fix64) -> Vec<EntryHandle> {
        let query = BoundingBox::new(center - Vector3::splat(radius), center + Vector3::splat(radius));
        self.query_bounding_box(query)
            .into_iter()
            .filter(|handle| {
                let bb = self.entries[handle.0].bounding_box;
                let closest = bb.min.max(bb.max.min(center));
                (closest - center).length_squared() <= radius.safe_mul(radius)
            })
            .collect()
    }

    /// Debug/testing helper: rebuilds an owner-lookup table.
    pub fn owners(&self) -> HashMap<EntryHandle, u64> {
        self.entries.iter().map(|(i, e)| (EntryHandle(i), e.owner)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fix64;

    fn box_at(x: f64) -> BoundingBox {
        BoundingBox::new(
            Vector3::new(Fix64::from_f64(x), Fix64::ZERO, Fix64::ZERO),
            Vector3::new(Fix64::from_f64(x + 1.0), Fix64::ONE, Fix64::ONE),
        )
    }

    #[test]
    fn overlapping_entries_are_reported() {
        let mut bvh = BoundingVolumeHierarchy::new();
        let a = bvh.insert(box_at(0.0), 1);
        let b = bvh.insert(box_at(0.5), 2);
        let overlaps = bvh.compute_overlaps();
        assert!(overlaps.iter().any(|o| (o.a == a && o.b == b) || (o.a == b && o.b == a)));
    }

    #[test]
    fn far_apart_entries_do_not_overlap() {
        let mut bvh = BoundingVolumeHierarchy::new();
        bvh.insert(box_at(0.0), 1);
        bvh.insert(box_at(100.0), 2);
        assert!(bvh.compute_overlaps().is_empty());
    }

    #[test]
    fn remove_drops_entry_from_future_overlaps() {
        let mut bvh = BoundingVolumeHierarchy::new();
        let a = bvh.insert(box_at(0.0), 1);
        let b = bvh.insert(box_at(0.5), 2);
        bvh.remove(a);
        let overlaps = bvh.compute_overlaps();
        assert!(overlaps.is_empty());
        assert!(bvh.bounding_box(b).is_some());
    }

    #[test]
    fn refit_after_move_updates_root_box() {
        let mut bvh = BoundingVolumeHierarchy::new();
        let a = bvh.insert(box_at(0.0), 1);
        bvh.insert(box_at(10.0), 2);
        bvh.set_bounding_box(a, box_at(20.0));
        bvh.refit();
        let overlaps = bvh.compute_overlaps();
        assert!(overlaps.is_empty());
    }
}
