use crate::math::{Fix64, RigidTransform, Vector3};

use super::gjk::SimplexVertex;
use super::shape::Shape;

/// Penetration result: the minimum-translation-vector normal (pointing from
/// `b` toward `a`), the penetration depth, and a representative world contact
/// point on each shape.
#[derive(Copy, Clone, Debug)]
pub struct PenetrationInfo {
    pub normal: Vector3,
    pub depth: Fix64,
    pub on_a: Vector3,
    pub on_b: Vector3,
}

#[derive(Copy, Clone, Debug)]
struct Vertex {
    point: Vector3,
    on_a: Vector3,
    on_b: Vector3,
}

#[derive(Copy, Clone, Debug)]
struct Face {
    indices: [usize; 3],
    normal: Vector3,
    distance: Fix64,
}

const MAX_ITERATIONS: usize = 32;
const TOLERANCE: Fix64 = Fix64::from_raw(429_497); // ~ 1e-4

/// Expanding Polytope Algorithm: recovers penetration depth from the
/// tetrahedron GJK terminated with (spec.md section 4.4: "EPA... for
/// penetrating cases"). Requires the starting simplex to already enclose
/// the origin.
pub fn epa(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
    simplex: &[SimplexVertex],
) -> Option<PenetrationInfo> {
    let mut vertices: Vec<Vertex> = simplex
        .iter()
        .map(|v| Vertex { point: v.point, on_a: v.on_a, on_b: v.on_b })
        .collect();

    if vertices.len() < 4 {
        return None;
    }

    let mut faces = build_initial_faces(&vertices)?;

    for _ in 0..MAX_ITERATIONS {
        let (closest_index, closest) = faces
            .iter()
            .enumerate()
            .min_by_key(|(_, f)| f.distance.raw())
            .map(|(i, f)| (i, *f))?;

        let dir = closest.normal;
        let local_dir_a = pose_a.orientation.conjugate().rotate(dir);
        let local_dir_b = pose_b.orientation.conjugate().rotate(-dir);
        let on_a = pose_a.transform_point(shape_a.support_with_margin(local_dir_a)?);
        let on_b = pose_b.transform_point(shape_b.support_with_margin(local_dir_b)?);
        let support = on_a - on_b;

        let support_distance = support.dot(dir);
        if support_distance.safe_sub(closest.distance) < TOLERANCE {
            return Some(PenetrationInfo {
                normal: closest.normal,
                depth: closest.distance,
                on_a: barycentric_point(&vertices, &closest, true),
                on_b: barycentric_point(&vertices, &closest, false),
            });
        }

        let new_index = vertices.len();
        vertices.push(Vertex { point: support, on_a, on_b });

        // Remove every face visible from the new point, collect the
        // boundary (silhouette) edges, and re-triangulate with the new
        // vertex, the standard EPA polytope-expansion step.
        let mut visible = vec![false; faces.len()];
        for (i, face) in faces.iter().enumerate() {
            let to_support = support - vertices[face.indices[0]].point;
            visible[i] = face.normal.dot(to_support) > Fix64::ZERO;
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (i, face) in faces.iter().enumerate() {
            if !visible[i] {
                continue;
            }
            let edge_list = [
                (face.indices[0], face.indices[1]),
                (face.indices[1], face.indices[2]),
                (face.indices[2], face.indices[0]),
            ];
            for &(a, b) in &edge_list {
                if let Some(pos) = edges.iter().position(|&(ea, eb)| ea == b && eb == a) {
                    edges.remove(pos);
                } else {
                    edges.push((a, b));
                }
            }
        }

        let mut next_faces: Vec<Face> = faces
            .iter()
            .enumerate()
            .filter(|(i, _)| !visible[*i])
            .map(|(_, f)| *f)
            .collect();

        for (a, b) in edges {
            if let Some(face) = make_face(&vertices, [a, b, new_index]) {
                next_faces.push(face);
            }
        }

        if next_faces.is_empty() {
            break;
        }
        faces = next_faces;
    }

    faces
        .iter()
        .min_by_key(|f| f.distance.raw())
        .map(|f| PenetrationInfo {
            normal: f.normal,
            depth: f.distance,
            on_a: barycentric_point(&vertices, f, true),
            on_b: barycentric_point(&vertices, f, false),
        })
}

fn make_face(vertices: &[Vertex], indices: [usize; 3]) -> Option<Face> {
    let [ia, ib, ic] = indices;
    let a = vertices[ia].point;
    let b = vertices[ib].point;
    let c = vertices[ic].point;
    let mut normal = (b - a).cross(c - a);
    let (unit, _) = normal.normalize()?;
    normal = unit;

    // Orient the normal outward (away from the origin, which lies inside
    // the polytope by construction).
    let mut distance = normal.dot(a);
    let mut ordered = indices;
    if distance < Fix64::ZERO {
        normal = -normal;
        distance = -distance;
        ordered = [ia, ic, ib];
    }

    Some(Face { indices: ordered, normal, distance })
}

fn build_initial_faces(vertices: &[Vertex]) -> Option<Vec<Face>> {
    let candidate_faces = [[0, 1, 2], [0, 3, 1], [1, 3, 2], [2, 3, 0]];
    let mut faces = Vec::with_capacity(4);
    for idx in candidate_faces {
        faces.push(make_face(vertices, idx)?);
    }
    Some(faces)
}

/// Recovers a representative world contact point on shape `a` or `b` by
/// projecting the origin-closest point of `face` (computed in barycentric
/// coordinates of the Minkowski-difference triangle) onto the
/// corresponding triangle of support points on that shape.
fn barycentric_point(vertices: &[Vertex], face: &Face, want_a: bool) -> Vector3 {
    let p0 = vertices[face.indices[0]].point;
    let p1 = vertices[face.indices[1]].point;
    let p2 = vertices[face.indices[2]].point;
    let (u, v, w) = barycentric_of_closest_point_to_origin(p0, p1, p2);

    let get = |v: &Vertex| if want_a { v.on_a } else { v.on_b };
    let a0 = get(&vertices[face.indices[0]]);
    let a1 = get(&vertices[face.indices[1]]);
    let a2 = get(&vertices[face.indices[2]]);
    a0 * u + a1 * v + a2 * w
}

fn barycentric_of_closest_point_to_origin(a: Vector3, b: Vector3, c: Vector3) -> (Fix64, Fix64, Fix64) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = -a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00.safe_mul(d11).safe_sub(d01.safe_mul(d01));
    if denom.is_zero() {
        return (Fix64::from_ratio(1, 3), Fix64::from_ratio(1, 3), Fix64::from_ratio(1, 3));
    }
    let v = (d11.safe_mul(d20).safe_sub(d01.safe_mul(d21))).safe_div(denom);
    let w = (d00.safe_mul(d21).safe_sub(d01.safe_mul(d20))).safe_div(denom);
    let u = Fix64::ONE.safe_sub(v).safe_sub(w);
    (u, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::gjk::{gjk, GjkResult};
    use crate::geometry::shape::{BoxShape, Shape};
    use crate::math::Quaternion;

    #[test]
    fn overlapping_boxes_produce_positive_depth() {
        let a = Shape::Box(BoxShape { half_extents: Vector3::splat(Fix64::ONE) });
        let b = Shape::Box(BoxShape { half_extents: Vector3::splat(Fix64::ONE) });
        let pose_a = RigidTransform::new(Vector3::ZERO, Quaternion::IDENTITY);
        let pose_b = RigidTransform::new(Vector3::new(Fix64::from_f64(1.5), Fix64::ZERO, Fix64::ZERO), Quaternion::IDENTITY);

        let simplex = match gjk(&a, pose_a, &b, pose_b).unwrap() {
            GjkResult::Overlapping { simplex } => simplex,
            GjkResult::Separated { .. } => panic!("expected overlap"),
        };

        let info = epa(&a, pose_a, &b, pose_b, &simplex).unwrap();
        assert!(info.depth.to_f64() > 0.0);
        assert!(info.depth.to_f64() < 1.0);
    }
}
