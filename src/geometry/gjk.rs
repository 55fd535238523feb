use arrayvec::ArrayVec;

use crate::math::{Fix64, RigidTransform, Vector3};

use super::shape::Shape;

/// A point on the Minkowski difference `A - B`, carrying the supporting
/// points on each shape so a hit result can recover contact points.
#[derive(Copy, Clone, Debug)]
struct SupportPoint {
    point: Vector3,
    on_a: Vector3,
    on_b: Vector3,
}

fn minkowski_support(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
    dir: Vector3,
) -> Option<SupportPoint> {
    let local_dir_a = pose_a.orientation.conjugate().rotate(dir);
    let local_dir_b = pose_b.orientation.conjugate().rotate(-dir);
    let on_a = pose_a.transform_point(shape_a.support_with_margin(local_dir_a)?);
    let on_b = pose_b.transform_point(shape_b.support_with_margin(local_dir_b)?);
    Some(SupportPoint { point: on_a - on_b, on_a, on_b })
}

/// Result of a GJK query: either shapes are disjoint (with the closest
/// points and separation), or they overlap (with the terminal simplex, fed
/// into EPA for penetration depth).
pub enum GjkResult {
    Separated { distance: Fix64, on_a: Vector3, on_b: Vector3 },
    Overlapping { simplex: ArrayVec<SimplexVertex, 4> },
}

#[derive(Copy, Clone, Debug)]
pub struct SimplexVertex {
    pub point: Vector3,
    pub on_a: Vector3,
    pub on_b: Vector3,
}

const MAX_ITERATIONS: usize = 64;
const TOLERANCE: Fix64 = Fix64::from_raw(42_949); // ~ 1e-5

/// Gilbert-Johnson-Keerthi distance/intersection test between two convex
/// shapes in world space (spec.md section 4.4: "convex-convex pairs use
/// GJK for separated cases and EPA... for penetrating cases").
pub fn gjk(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
) -> Option<GjkResult> {
    let mut simplex: ArrayVec<SimplexVertex, 4> = ArrayVec::new();

    let mut dir = pose_b.position - pose_a.position;
    if dir.length_squared().is_zero() {
        dir = Vector3::X;
    }

    let first = minkowski_support(shape_a, pose_a, shape_b, pose_b, dir)?;
    simplex.push(SimplexVertex { point: first.point, on_a: first.on_a, on_b: first.on_b });
    dir = -first.point;

    for _ in 0..MAX_ITERATIONS {
        if dir.length_squared().is_zero() {
            return Some(GjkResult::Overlapping { simplex });
        }
        let sp = minkowski_support(shape_a, pose_a, shape_b, pose_b, dir)?;
        if sp.point.dot(dir) < Fix64::ZERO {
            // The new point does not pass the origin's plane: shapes are separated.
            let (closest_a, closest_b) = closest_points_on_simplex(&simplex);
            let distance = (closest_a - closest_b).length().unwrap_or(Fix64::ZERO);
            return Some(GjkResult::Separated { distance, on_a: closest_a, on_b: closest_b });
        }

        simplex.push(SimplexVertex { point: sp.point, on_a: sp.on_a, on_b: sp.on_b });

        if do_simplex(&mut simplex, &mut dir) {
            return Some(GjkResult::Overlapping { simplex });
        }

        if dir.length_squared() < TOLERANCE {
            let (closest_a, closest_b) = closest_points_on_simplex(&simplex);
            let distance = (closest_a - closest_b).length().unwrap_or(Fix64::ZERO);
            return Some(GjkResult::Separated { distance, on_a: closest_a, on_b: closest_b });
        }
    }

    // Failed to converge; report the current simplex as the best estimate.
    let (closest_a, closest_b) = closest_points_on_simplex(&simplex);
    let distance = (closest_a - closest_b).length().unwrap_or(Fix64::ZERO);
    Some(GjkResult::Separated { distance, on_a: closest_a, on_b: closest_b })
}

/// Reduces `simplex` toward the origin, updating `dir` to the new search
/// direction. Returns `true` if the origin lies inside the simplex
/// (tetrahedron case), meaning the shapes overlap.
fn do_simplex(simplex: &mut ArrayVec<SimplexVertex, 4>, dir: &mut Vector3) -> bool {
    match simplex.len() {
        2 => {
            let a = simplex[1];
            let b = simplex[0];
            let ab = b.point - a.point;
            let ao = -a.point;
            if ab.dot(ao) > Fix64::ZERO {
                *dir = triple_cross(ab, ao, ab);
                if dir.length_squared().is_zero() {
                    *dir = ab.orthonormal_vector();
                }
            } else {
                simplex.clear();
                simplex.push(a);
                *dir = ao;
            }
            false
        }
        3 => {
            let a = simplex[2];
            let b = simplex[1];
            let c = simplex[0];
            let ab = b.point - a.point;
            let ac = c.point - a.point;
            let ao = -a.point;
            let abc = ab.cross(ac);

            if abc.cross(ac).dot(ao) > Fix64::ZERO {
                if ac.dot(ao) > Fix64::ZERO {
                    simplex.clear();
                    simplex.push(c);
                    simplex.push(a);
                    *dir = triple_cross(ac, ao, ac);
                } else {
                    simplex.clear();
                    simplex.push(b);
                    simplex.push(a);
                    return do_simplex(simplex, dir);
                }
            } else if ab.cross(abc).dot(ao) > Fix64::ZERO {
                simplex.clear();
                simplex.push(b);
                simplex.push(a);
                return do_simplex(simplex, dir);
            } else if abc.dot(ao) > Fix64::ZERO {
                *dir = abc;
            } else {
                simplex.clear();
                simplex.push(b);
                simplex.push(c);
                simplex.push(a);
                *dir = -abc;
            }
            false
        }
        4 => {
            let a = simplex[3];
            let b = simplex[2];
            let c = simplex[1];
            let d = simplex[0];
            let ao = -a.point;

            let abc = (b.point - a.point).cross(c.point - a.point);
            let acd = (c.point - a.point).cross(d.point - a.point);
            let adb = (d.point - a.point).cross(b.point - a.point);

            if abc.dot(ao) > Fix64::ZERO {
                simplex.clear();
                simplex.push(c);
                simplex.push(b);
                simplex.push(a);
                return do_simplex(simplex, dir);
            }
            if acd.dot(ao) > Fix64::ZERO {
                simplex.clear();
                simplex.push(d);
                simplex.push(c);
                simplex.push(a);
                return do_simplex(simplex, dir);
            }
            if adb.dot(ao) > Fix64::ZERO {
                simplex.clear();
                simplex.push(b);
                simplex.push(d);
                simplex.push(a);
                return do_simplex(simplex, dir);
            }
            true
        }
        _ => false,
    }
}

fn triple_cross(a: Vector3, b: Vector3, c: Vector3) -> Vector3 {
    a.cross(b).cross(c)
}

/// Computes the closest points on each shape from whichever simplex GJK
/// terminated with (used only in the separated branch; degenerates
/// gracefully for 1- and 2-vertex simplices).
fn closest_points_on_simplex(simplex: &ArrayVec<SimplexVertex, 4>) -> (Vector3, Vector3) {
    match simplex.len() {
        1 => (simplex[0].on_a, simplex[0].on_b),
        2 => {
            let a = simplex[1];
            let b = simplex[0];
            let ab = b.point - a.point;
            let t = if ab.length_squared().is_zero() {
                Fix64::ZERO
            } else {
                (-a.point.dot(ab)).safe_div(ab.length_squared()).clamp(Fix64::ZERO, Fix64::ONE)
            };
            (a.on_a.lerp(b.on_a, t), a.on_b.lerp(b.on_b, t))
        }
        _ => {
            // Average the last three vertices as a reasonable (if
            // approximate) closest-point estimate for triangle/tetra
            // simplices; callers only use this in near-contact cases where
            // the simplex is nearly degenerate anyway.
            let n = simplex.len().min(3);
            let mut on_a = Vector3::ZERO;
            let mut on_b = Vector3::ZERO;
            for v in simplex.iter().rev().take(n) {
                on_a += v.on_a;
                on_b += v.on_b;
            }
            let inv_n = Fix64::ONE.safe_div(Fix64::from_i32(n as i32));
            (on_a * inv_n, on_b * inv_n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::shape::{Shape, Sphere};
    use crate::math::Quaternion;

    #[test]
    fn separated_spheres_report_distance() {
        let a = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let b = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let pose_a = RigidTransform::new(Vector3::ZERO, Quaternion::IDENTITY);
        let pose_b = RigidTransform::new(Vector3::new(Fix64::from_i32(5), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY);
        match gjk(&a, pose_a, &b, pose_b).unwrap() {
            GjkResult::Separated { distance, .. } => {
                assert!((distance.to_f64() - 3.0).abs() < 0.2);
            }
            GjkResult::Overlapping { .. } => panic!("expected separated"),
        }
    }

    #[test]
    fn overlapping_spheres_detected() {
        let a = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let b = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let pose_a = RigidTransform::new(Vector3::ZERO, Quaternion::IDENTITY);
        let pose_b = RigidTransform::new(Vector3::new(Fix64::from_f64(0.5), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY);
        match gjk(&a, pose_a, &b, pose_b).unwrap() {
            GjkResult::Overlapping { .. } => {}
            GjkResult::Separated { distance, .. } => panic!("expected overlap, got distance {}", distance.to_f64()),
        }
    }
}
