//! Round-trip laws and quantified invariants over the scalar/geometric
//! layer (spec.md section 8).

use fixrigid3d::geometry::BoundingBox;
use fixrigid3d::math::{Fix64, Quaternion, Vector3};

fn close(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

#[test]
fn fix64_raw_round_trips() {
    for raw in [0i64, 1, -1, 1 << 32, -(1 << 32), i64::MAX / 2, i64::MIN / 2 + 1] {
        let value = Fix64::from_raw(raw);
        assert_eq!(Fix64::from_raw(value.raw()), value);
    }
}

#[test]
fn exp2_log2_round_trip_within_lut_resolution() {
    for x in [0.25, 0.5, 1.0, 2.0, 3.5, 10.0] {
        let fx = Fix64::from_f64(x);
        let doubled = fx.exp2().log2().expect("exp2 output is always positive");
        assert!(close(doubled.to_f64(), x, 1e-3), "exp2/log2 round trip drifted for {x}: got {}", doubled.to_f64());
    }
}

#[test]
fn ln_and_log2_agree_via_change_of_base() {
    let x = Fix64::from_f64(7.389);
    let ln_x = x.ln().unwrap();
    let log2_x = x.log2().unwrap();
    assert!(close(ln_x.to_f64(), log2_x.to_f64() / Fix64::LOG2_E.to_f64(), 1e-3));
}

#[test]
fn quaternion_matrix_round_trip_is_approximately_identity() {
    let q = Quaternion::from_axis_angle(Vector3::new(Fix64::from_f64(0.3), Fix64::from_f64(0.7), Fix64::from_f64(0.2)), Fix64::from_f64(0.9))
        .normalize();
    let recovered = Quaternion::from_matrix(q.to_matrix());

    // Sign-ambiguous: `q` and `-q` represent the same rotation.
    let same_sign = close(recovered.w.to_f64(), q.w.to_f64(), 1e-2);
    let (a, b) = if same_sign { (recovered, q) } else { (recovered, Quaternion::new_unchecked(-q.x, -q.y, -q.z, -q.w)) };
    assert!(close(a.x.to_f64(), b.x.to_f64(), 1e-2));
    assert!(close(a.y.to_f64(), b.y.to_f64(), 1e-2));
    assert!(close(a.z.to_f64(), b.z.to_f64(), 1e-2));
    assert!(close(a.w.to_f64(), b.w.to_f64(), 1e-2));
}

#[test]
fn bounding_box_merge_with_self_is_identity() {
    let a = BoundingBox::new(Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::ZERO), Vector3::new(Fix64::ONE, Fix64::TWO, Fix64::ONE));
    assert_eq!(a.merge(a), a);
}

#[test]
fn bounding_box_intersects_self_since_min_never_exceeds_max() {
    // `BoundingBox::new`'s own invariant (`min <= max` componentwise) makes
    // `intersects(a, a)` unconditionally true for any box that exists.
    let valid = BoundingBox::new(Vector3::ZERO, Vector3::new(Fix64::ONE, Fix64::ONE, Fix64::ONE));
    assert!(valid.intersects(valid));
}

#[test]
fn saturating_add_clamps_instead_of_wrapping() {
    let sum = Fix64::MAX.safe_add(Fix64::ONE);
    assert_eq!(sum, Fix64::MAX);

    let sum = Fix64::MIN.safe_sub(Fix64::ONE);
    assert_eq!(sum, Fix64::MIN);
}

#[test]
fn unit_quaternion_norm_is_preserved_by_integration() {
    let mut q = Quaternion::IDENTITY;
    let angular_velocity = Vector3::new(Fix64::from_f64(1.0), Fix64::from_f64(2.0), Fix64::from_f64(-0.5));
    let dt = Fix64::from_ratio(1, 60);
    for _ in 0..240 {
        q = q.integrate(angular_velocity, dt);
    }
    let norm = q.length_squared().sqrt().unwrap().to_f64();
    assert!(close(norm, 1.0, 1e-6), "quaternion drifted off the unit sphere: {norm}");
}

#[test]
fn vector_normalize_round_trips_length_and_direction() {
    let v = Vector3::new(Fix64::from_f64(3.0), Fix64::from_f64(4.0), Fix64::ZERO);
    let (unit, length) = v.normalize().expect("nonzero vector normalizes");
    assert!(close(length.to_f64(), 5.0, 1e-6));
    let reconstructed = unit * length;
    assert!(close(reconstructed.x.to_f64(), v.x.to_f64(), 1e-6));
    assert!(close(reconstructed.y.to_f64(), v.y.to_f64(), 1e-6));
}
