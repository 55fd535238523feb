//! Broad-phase invariants (spec.md section 8): every pair of intersecting
//! world boxes is emitted exactly once, queries agree with brute-force
//! containment, and a refit after many moves still finds every overlap.

use fixrigid3d::broad_phase::BoundingVolumeHierarchy;
use fixrigid3d::math::{Fix64, Vector3};
use std::collections::HashSet;

fn box_at(center: Vector3, half_extent: f64) -> fixrigid3d::geometry::BoundingBox {
    let h = Vector3::splat(Fix64::from_f64(half_extent));
    fixrigid3d::geometry::BoundingBox::new(center - h, center + h)
}

#[test]
fn overlapping_pair_is_emitted_exactly_once() {
    let mut bvh = BoundingVolumeHierarchy::new();
    let a = bvh.insert(box_at(Vector3::ZERO, 0.5), 1);
    let b = bvh.insert(box_at(Vector3::new(Fix64::from_f64(0.4), Fix64::ZERO, Fix64::ZERO), 0.5), 2);
    let c = bvh.insert(box_at(Vector3::new(Fix64::from_f64(100.0), Fix64::ZERO, Fix64::ZERO), 0.5), 3);

    let overlaps = bvh.compute_overlaps();
    let pairs: HashSet<(u64, u64)> = overlaps
        .iter()
        .map(|o| {
            let owner_a = bvh.owner(o.a).unwrap();
            let owner_b = bvh.owner(o.b).unwrap();
            (owner_a.min(owner_b), owner_a.max(owner_b))
        })
        .collect();

    assert_eq!(overlaps.len(), 1, "only a and b should overlap, got {overlaps:?}");
    assert!(pairs.contains(&(1, 2)));
    let _ = (a, b, c);
}

#[test]
fn non_overlapping_entries_emit_nothing() {
    let mut bvh = BoundingVolumeHierarchy::new();
    for i in 0..8 {
        bvh.insert(box_at(Vector3::new(Fix64::from_f64(i as f64 * 10.0), Fix64::ZERO, Fix64::ZERO), 0.5), i as u64);
    }
    assert!(bvh.compute_overlaps().is_empty());
}

#[test]
fn query_bounding_box_matches_brute_force_containment() {
    let mut bvh = BoundingVolumeHierarchy::new();
    let mut boxes = Vec::new();
    for i in 0..20 {
        let center = Vector3::new(Fix64::from_f64(i as f64 * 1.3), Fix64::from_f64((i % 3) as f64), Fix64::ZERO);
        let bb = box_at(center, 0.4);
        bvh.insert(bb, i as u64);
        boxes.push(bb);
    }

    let query = box_at(Vector3::new(Fix64::from_f64(5.0), Fix64::ZERO, Fix64::ZERO), 2.0);
    let found: HashSet<u64> = bvh.query_bounding_box(query).into_iter().map(|h| bvh.owner(h).unwrap()).collect();
    let expected: HashSet<u64> =
        (0..20u64).filter(|&i| query.intersects(boxes[i as usize])).collect();
    assert_eq!(found, expected);
}

#[test]
fn query_sphere_only_returns_entries_within_radius() {
    let mut bvh = BoundingVolumeHierarchy::new();
    let near = bvh.insert(box_at(Vector3::new(Fix64::from_f64(0.2), Fix64::ZERO, Fix64::ZERO), 0.1), 1);
    let far = bvh.insert(box_at(Vector3::new(Fix64::from_f64(10.0), Fix64::ZERO, Fix64::ZERO), 0.1), 2);

    let hits = bvh.query_sphere(Vector3::ZERO, Fix64::from_f64(1.0));
    assert!(hits.contains(&near));
    assert!(!hits.contains(&far));
}

#[test]
fn remove_then_query_no_longer_finds_the_entry() {
    let mut bvh = BoundingVolumeHierarchy::new();
    let handle = bvh.insert(box_at(Vector3::ZERO, 0.5), 1);
    assert_eq!(bvh.len(), 1);

    bvh.remove(handle);
    assert!(bvh.is_empty());
    assert!(bvh.query_sphere(Vector3::ZERO, Fix64::from_f64(10.0)).is_empty());
}

#[test]
fn refit_after_many_moves_still_finds_every_overlap() {
    let mut bvh = BoundingVolumeHierarchy::new();
    let mut handles = Vec::new();
    for i in 0..30 {
        let center = Vector3::new(Fix64::from_f64(i as f64 * 5.0), Fix64::ZERO, Fix64::ZERO);
        handles.push(bvh.insert(box_at(center, 0.5), i as u64));
    }

    // Walk every entry toward the origin over many ticks, forcing repeated
    // tree rotations and subtree revalidation (spec.md section 4.3 "refit").
    for _tick in 0..40 {
        for (i, &handle) in handles.iter().enumerate() {
            let bb = bvh.bounding_box(handle).unwrap();
            let step = Vector3::new(Fix64::from_f64(-(i as f64) * 0.1), Fix64::ZERO, Fix64::ZERO);
            bvh.set_bounding_box(handle, fixrigid3d::geometry::BoundingBox::new(bb.min + step, bb.max + step));
        }
        bvh.refit();
    }

    // After walking inward for 40 ticks every entry should now cluster near
    // the origin and overlap its neighbors; brute force confirms the BVH
    // found the same set compute_overlaps did.
    let overlaps = bvh.compute_overlaps();
    let mut brute_force = 0usize;
    for i in 0..handles.len() {
        for j in (i + 1)..handles.len() {
            if bvh.bounding_box(handles[i]).unwrap().intersects(bvh.bounding_box(handles[j]).unwrap()) {
                brute_force += 1;
            }
        }
    }
    assert_eq!(overlaps.len(), brute_force);
    assert!(brute_force > 0, "expected at least some overlaps after converging toward the origin");
}
