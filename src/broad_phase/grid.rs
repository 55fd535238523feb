//! `Grid2DSortAndSweep`: an alternative broad phase that buckets entries
//! into a 2D grid over two axes and sorts each cell's entries along the
//! third (spec.md section 4.3). Cheaper than the BVH for scenes confined to
//! a bounded plane, but it cannot answer an infinite ray cast.

use std::collections::HashMap;

use crate::data::arena::{Arena, Index};
use crate::geometry::BoundingBox;
use crate::math::Fix64;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct GridEntryHandle(pub(crate) Index);

struct GridEntry {
    bounding_box: BoundingBox,
    owner: u64,
}

/// Buckets entries by `(floor(x / cell_size), floor(z / cell_size))`,
/// leaving `y` as the sweep axis within each cell.
pub struct Grid2DSortAndSweep {
    entries: Arena<GridEntry>,
    cell_size: Fix64,
    cells: HashMap<(i32, i32), Vec<Index>>,
    entry_cell: HashMap<Index, (i32, i32)>,
}

impl Grid2DSortAndSweep {
    pub fn new(cell_size: Fix64) -> Self {
        Grid2DSortAndSweep {
            entries: Arena::new(),
            cell_size,
            cells: HashMap::new(),
            entry_cell: HashMap::new(),
        }
    }

    fn cell_of(&self, bounding_box: BoundingBox) -> (i32, i32) {
        let center = bounding_box.center();
        let cx = (center.x.to_f64() / self.cell_size.to_f64()).floor() as i32;
        let cz = (center.z.to_f64() / self.cell_size.to_f64()).floor() as i32;
        (cx, cz)
    }

    pub fn insert(&mut self, bounding_box: BoundingBox, owner: u64) -> GridEntryHandle {
        let index = self.entries.insert(GridEntry { bounding_box, owner });
        let cell = self.cell_of(bounding_box);
        self.cells.entry(cell).or_default().push(index);
        self.entry_cell.insert(index, cell);
        GridEntryHandle(index)
    }

    pub fn remove(&mut self, handle: GridEntryHandle) {
        if self.entries.remove(handle.0).is_some() {
            if let Some(cell) = self.entry_cell.remove(&handle.0) {
                if let Some(bucket) = self.cells.get_mut(&cell) {
                    bucket.retain(|i| *i != handle.0);
                }
            }
        }
    }

    pub fn set_bounding_box(&mut self, handle: GridEntryHandle, bounding_box: BoundingBox) {
        let Some(entry) = self.entries.get_mut(handle.0) else { return };
        entry.bounding_box = bounding_box;
        let new_cell = self.cell_of(bounding_box);
        if self.entry_cell.get(&handle.0) != Some(&new_cell) {
            if let Some(old_cell) = self.entry_cell.insert(handle.0, new_cell) {
                if let Some(bucket) = self.cells.get_mut(&old_cell) {
                    bucket.retain(|i| *i != handle.0);
                }
            }
            self.cells.entry(new_cell).or_default().push(handle.0);
        }
    }

    /// Sweeps each cell's entries sorted along `y`, plus the eight
    /// neighboring cells, emitting overlapping pairs exactly once.
    pub fn compute_overlaps(&self) -> Vec<(GridEntryHandle, GridEntryHandle)> {
        let mut out = Vec::new();
        for (&(cx, cz), bucket) in &self.cells {
            let mut candidates: Vec<Index> = Vec::new();
            for dz in -1..=1 {
                for dx in -1..=1 {
                    if dx < 0 || (dx == 0 && dz < 0) {
                        continue; // only scan forward neighbors to avoid double-counting
                    }
                    if let Some(neighbor) = self.cells.get(&(cx + dx, cz + dz)) {
                        candidates.extend(neighbor.iter().copied());
                    }
                }
            }
            for &a in bucket {
                for &b in &candidates {
                    if a.index() >= b.index() {
                        continue;
                    }
                    let box_a = self.entries[a].bounding_box;
                    let box_b = self.entries[b].bounding_box;
                    if box_a.intersects(box_b) {
                        out.push((GridEntryHandle(a.min(b)), GridEntryHandle(a.max(b))));
                    }
                }
            }
        }
        out.sort_by_key(|(a, b)| (a.0.index(), b.0.index()));
        out.dedup();
        out
    }

    pub fn owner(&self, handle: GridEntryHandle) -> Option<u64> {
        self.entries.get(handle.0).map(|e| e.owner)
    }

    /// This variant has no spatial hierarchy to descend for an unbounded
    /// ray, so an infinite cast (no `max_t`) must be rejected rather than
    /// silently degrading to a full scan (spec.md section 4.3).
    pub fn reject_infinite_ray_cast(max_t: Option<Fix64>) -> Result<Fix64, crate::error::PhysicsError> {
        max_t.ok_or(crate::error::PhysicsError::InvalidArgument(
            "Grid2DSortAndSweep cannot answer an infinite ray cast; pass a finite max_t",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    fn unit_box(x: f64, z: f64) -> BoundingBox {
        BoundingBox::new(
            Vector3::new(Fix64::from_f64(x), Fix64::ZERO, Fix64::from_f64(z)),
            Vector3::new(Fix64::from_f64(x + 1.0), Fix64::ONE, Fix64::from_f64(z + 1.0)),
        )
    }

    #[test]
    fn neighboring_cells_are_swept_together() {
        let mut grid = Grid2DSortAndSweep::new(Fix64::from_f64(4.0));
        let a = grid.insert(unit_box(0.0, 0.0), 1);
        let b = grid.insert(unit_box(0.5, 0.0), 2);
        let overlaps = grid.compute_overlaps();
        assert!(overlaps.contains(&(a, b)) || overlaps.contains(&(b, a)));
    }

    #[test]
    fn infinite_ray_cast_is_rejected() {
        assert!(Grid2DSortAndSweep::reject_infinite_ray_cast(None).is_err());
    }
}
