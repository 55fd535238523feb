//! Narrow-phase invariants (spec.md section 8): manifold contact counts,
//! touching-boundary depth, warm-start persistence across ticks, and
//! candidate generation for every shape-pair routing path.

use fixrigid3d::dynamics::RigidBodyHandle;
use fixrigid3d::geometry::{BoxShape, Compound, CompoundChild, Shape, Sphere, TriangleMesh};
use fixrigid3d::math::{Fix64, Quaternion, RigidTransform, Vector3};
use fixrigid3d::narrow_phase::{generate_candidates, ContactManifold, NarrowPhaseConfig};

fn handle(raw: usize) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(raw, 1)
}

fn pose_at(x: f64) -> RigidTransform {
    RigidTransform::new(Vector3::new(Fix64::from_f64(x), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY)
}

#[test]
fn touching_spheres_produce_a_zero_depth_contact() {
    let shape_a = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(2.0);

    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].depth.abs().to_f64() < 1e-6, "expected ~zero depth at exact touching, got {:?}", candidates[0].depth.to_f64());
}

#[test]
fn touching_boxes_produce_a_zero_depth_contact() {
    let half = Vector3::splat(Fix64::ONE);
    let shape_a = Shape::Box(BoxShape { half_extents: half });
    let shape_b = Shape::Box(BoxShape { half_extents: half });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(2.0);

    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    assert!(!candidates.is_empty(), "touching boxes should still produce at least one contact");
    for c in &candidates {
        assert!(c.depth.abs().to_f64() < 1e-3, "unexpected depth {:?} for exactly touching boxes", c.depth.to_f64());
    }
}

#[test]
fn manifold_contacts_never_violate_minimum_separation() {
    let half = Vector3::splat(Fix64::ONE);
    let shape_a = Shape::Box(BoxShape { half_extents: half });
    let shape_b = Shape::Box(BoxShape { half_extents: half });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(1.9);

    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    let mut manifold = ContactManifold::new(handle(1), handle(2), Fix64::from_f64(0.5), Fix64::ZERO);
    manifold.update(pose_a, pose_b, &config, candidates);

    for i in 0..manifold.contacts.len() {
        for j in (i + 1)..manifold.contacts.len() {
            let d = (manifold.contacts[i].local_anchor_a - manifold.contacts[j].local_anchor_a).length().unwrap_or(Fix64::ZERO);
            assert!(
                d.to_f64() >= config.minimum_contact_separation.to_f64() - 1e-6,
                "contacts {i} and {j} are closer than minimum_contact_separation"
            );
        }
    }
}

#[test]
fn box_box_manifold_has_at_most_four_contacts() {
    let half = Vector3::splat(Fix64::ONE);
    let shape_a = Shape::Box(BoxShape { half_extents: half });
    let shape_b = Shape::Box(BoxShape { half_extents: half });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(1.99);

    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    let mut manifold = ContactManifold::new(handle(1), handle(2), Fix64::from_f64(0.5), Fix64::ZERO);
    manifold.update(pose_a, pose_b, &config, candidates);
    assert!(manifold.contacts.len() <= 4);
}

#[test]
fn warm_started_impulse_survives_a_matching_contact_across_ticks() {
    let shape_a = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(1.9);

    let config = NarrowPhaseConfig::default();
    let mut manifold = ContactManifold::new(handle(1), handle(2), Fix64::from_f64(0.5), Fix64::ZERO);

    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    manifold.update(pose_a, pose_b, &config, candidates);
    assert_eq!(manifold.contacts.len(), 1);
    manifold.contacts[0].normal_impulse = Fix64::from_f64(3.5);

    // A second tick with the bodies barely moved should match the same
    // contact (well within `minimum_contact_separation`) and must not reset
    // the impulse the solver would have warm-started from.
    let pose_b_next = pose_at(1.895);
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b_next, &config);
    manifold.update(pose_a, pose_b_next, &config, candidates);

    assert_eq!(manifold.contacts.len(), 1);
    assert_eq!(manifold.contacts[0].normal_impulse, Fix64::from_f64(3.5), "matched contact should keep its warm-started impulse");
}

#[test]
fn brand_new_contact_starts_with_zero_impulse() {
    let shape_a = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let pose_a = pose_at(0.0);
    let pose_b = pose_at(1.9);

    let config = NarrowPhaseConfig::default();
    let mut manifold = ContactManifold::new(handle(1), handle(2), Fix64::from_f64(0.5), Fix64::ZERO);
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    manifold.update(pose_a, pose_b, &config, candidates);
    assert_eq!(manifold.contacts[0].normal_impulse, Fix64::ZERO);
}

#[test]
fn manifold_reports_just_started_only_on_the_first_contacting_tick() {
    let shape_a = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let pose_a = pose_at(0.0);
    let config = NarrowPhaseConfig::default();
    let mut manifold = ContactManifold::new(handle(1), handle(2), Fix64::from_f64(0.5), Fix64::ZERO);

    // Far apart: no contact yet.
    let far = pose_at(10.0);
    manifold.update(pose_a, far, &config, generate_candidates(&shape_a, pose_a, &shape_b, far, &config));
    assert!(!manifold.just_started());

    // Now overlapping: should report just_started this tick only.
    let near = pose_at(1.9);
    manifold.update(pose_a, near, &config, generate_candidates(&shape_a, pose_a, &shape_b, near, &config));
    assert!(manifold.just_started());
    manifold.update(pose_a, near, &config, generate_candidates(&shape_a, pose_a, &shape_b, near, &config));
    assert!(!manifold.just_started());
}

#[test]
fn compound_recurses_into_each_child_against_the_other_shape() {
    let child_shape = Shape::Sphere(Sphere { radius: Fix64::ONE });
    let compound = Compound {
        children: vec![
            CompoundChild { local_transform: RigidTransform::new(Vector3::new(Fix64::from_f64(-3.0), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY), shape: child_shape },
            CompoundChild { local_transform: RigidTransform::new(Vector3::ZERO, Quaternion::IDENTITY), shape: child_shape },
        ],
    };
    let shape_a = Shape::Compound(compound);
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });

    let pose_a = pose_at(0.0);
    let pose_b = pose_at(1.9);
    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);

    // Only the child centered at the compound's origin is close enough to
    // `shape_b`; the far child at -3.0 should not contribute a candidate.
    assert_eq!(candidates.len(), 1);
}

#[test]
fn mesh_recurses_into_the_triangle_overlapping_the_other_shape() {
    let mesh = TriangleMesh {
        vertices: vec![
            Vector3::new(Fix64::from_f64(-5.0), Fix64::ZERO, Fix64::from_f64(-5.0)),
            Vector3::new(Fix64::from_f64(5.0), Fix64::ZERO, Fix64::from_f64(-5.0)),
            Vector3::new(Fix64::from_f64(0.0), Fix64::ZERO, Fix64::from_f64(5.0)),
        ],
        indices: vec![[0, 1, 2]],
        mobile: false,
        sidedness: fixrigid3d::geometry::Sidedness::DoubleSided,
    };
    let shape_a = Shape::StaticMesh(mesh);
    let shape_b = Shape::Sphere(Sphere { radius: Fix64::ONE });

    let pose_a = RigidTransform::IDENTITY;
    let pose_b = RigidTransform::new(Vector3::new(Fix64::ZERO, Fix64::from_f64(0.9), Fix64::ZERO), Quaternion::IDENTITY);
    let config = NarrowPhaseConfig::default();
    let candidates = generate_candidates(&shape_a, pose_a, &shape_b, pose_b, &config);
    assert!(!candidates.is_empty(), "sphere resting just above the triangle should generate a contact");
}
