//! Pair-specific analytic candidate generation for the shape pairs common
//! enough to warrant skipping GJK/EPA (spec.md section 4.4, step 2):
//! sphere/sphere, box/sphere, box/box. Anything else still goes through
//! [`super::generate_convex_candidates`].

use crate::geometry::{BoxShape, Sphere};
use crate::math::{Fix64, RigidTransform, Vector3};

use super::{NarrowPhaseConfig, RawCandidate};

pub fn sphere_sphere(
    sphere_a: &Sphere,
    pose_a: RigidTransform,
    sphere_b: &Sphere,
    pose_b: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Vec<RawCandidate> {
    let delta = pose_b.position - pose_a.position;
    let distance = delta.length().unwrap_or(Fix64::ZERO);
    let separation = distance.safe_sub(sphere_a.radius.safe_add(sphere_b.radius));
    if separation > config.speculative_contact_distance {
        return Vec::new();
    }
    let normal = delta.normalize().map(|(n, _)| n).unwrap_or(Vector3::Y);
    let point_a = pose_a.position + normal * sphere_a.radius;
    let point_b = pose_b.position - normal * sphere_b.radius;
    vec![RawCandidate { point_a, point_b, normal, depth: -separation }]
}

/// The outward normal and surface point of whichever box face `local_center`
/// (already known to be inside the box) is closest to, plus the penetration
/// depth to that face.
fn deepest_face(half_extents: Vector3, local_center: Vector3) -> (Vector3, Vector3, Fix64) {
    let penetration_x = half_extents.x.safe_sub(local_center.x.abs());
    let penetration_y = half_extents.y.safe_sub(local_center.y.abs());
    let penetration_z = half_extents.z.safe_sub(local_center.z.abs());

    if penetration_x <= penetration_y && penetration_x <= penetration_z {
        let sign = if local_center.x.raw() >= 0 { Fix64::ONE } else { -Fix64::ONE };
        let normal = Vector3::new(sign, Fix64::ZERO, Fix64::ZERO);
        let point = Vector3::new(sign.safe_mul(half_extents.x), local_center.y, local_center.z);
        (normal, point, penetration_x)
    } else if penetration_y <= penetration_z {
        let sign = if local_center.y.raw() >= 0 { Fix64::ONE } else { -Fix64::ONE };
        let normal = Vector3::new(Fix64::ZERO, sign, Fix64::ZERO);
        let point = Vector3::new(local_center.x, sign.safe_mul(half_extents.y), local_center.z);
        (normal, point, penetration_y)
    } else {
        let sign = if local_center.z.raw() >= 0 { Fix64::ONE } else { -Fix64::ONE };
        let normal = Vector3::new(Fix64::ZERO, Fix64::ZERO, sign);
        let point = Vector3::new(local_center.x, local_center.y, sign.safe_mul(half_extents.z));
        (normal, point, penetration_z)
    }
}

/// `box_shape`/`box_pose` play the role of body A, `sphere`/`sphere_pose` of
/// body B; callers pairing them the other way around swap the resulting
/// candidate's points and flip its normal.
pub fn box_sphere(
    box_shape: &BoxShape,
    box_pose: RigidTransform,
    sphere: &Sphere,
    sphere_pose: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Option<RawCandidate> {
    let local_center = box_pose.inverse_transform_point(sphere_pose.position);
    let clamped = Vector3::new(
        local_center.x.clamp(-box_shape.half_extents.x, box_shape.half_extents.x),
        local_center.y.clamp(-box_shape.half_extents.y, box_shape.half_extents.y),
        local_center.z.clamp(-box_shape.half_extents.z, box_shape.half_extents.z),
    );
    let outside_delta = local_center - clamped;
    let outside_distance = outside_delta.length().unwrap_or(Fix64::ZERO);

    let (local_normal, local_point, depth) = if outside_distance.is_zero() {
        let (normal, point, penetration) = deepest_face(box_shape.half_extents, local_center);
        (normal, point, sphere.radius.safe_add(penetration))
    } else {
        let separation = outside_distance.safe_sub(sphere.radius);
        if separation > config.speculative_contact_distance {
            return None;
        }
        let normal = outside_delta.normalize().map(|(n, _)| n).unwrap_or(Vector3::Y);
        (normal, clamped, -separation)
    };

    let world_normal = box_pose.transform_vector(local_normal).normalize().map(|(n, _)| n).unwrap_or(Vector3::Y);
    let point_on_box = box_pose.transform_point(local_point);
    let point_on_sphere = sphere_pose.position - world_normal * sphere.radius;
    Some(RawCandidate { point_a: point_on_box, point_b: point_on_sphere, normal: world_normal, depth })
}

struct OrientedBox {
    center: Vector3,
    axes: [Vector3; 3],
    half_extents: Vector3,
}

fn oriented_box(shape: &BoxShape, pose: RigidTransform) -> OrientedBox {
    OrientedBox {
        center: pose.position,
        axes: [
            pose.orientation.rotate(Vector3::X),
            pose.orientation.rotate(Vector3::Y),
            pose.orientation.rotate(Vector3::Z),
        ],
        half_extents: shape.half_extents,
    }
}

fn half_extent(v: Vector3, index: usize) -> Fix64 {
    match index {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn projected_radius(ob: &OrientedBox, axis: Vector3) -> Fix64 {
    (0..3)
        .map(|i| ob.axes[i].dot(axis).abs().safe_mul(half_extent(ob.half_extents, i)))
        .fold(Fix64::ZERO, Fix64::safe_add)
}

fn clip_polygon(poly: Vec<Vector3>, plane_normal: Vector3, plane_point: Vector3) -> Vec<Vector3> {
    if poly.is_empty() {
        return poly;
    }
    let mut out = Vec::with_capacity(poly.len() + 1);
    let n = poly.len();
    for i in 0..n {
        let current = poly[i];
        let next = poly[(i + 1) % n];
        let d_current = (current - plane_point).dot(plane_normal);
        let d_next = (next - plane_point).dot(plane_normal);
        let current_inside = d_current <= Fix64::ZERO;
        let next_inside = d_next <= Fix64::ZERO;
        if current_inside {
            out.push(current);
        }
        if current_inside != next_inside {
            let denom = d_current.safe_sub(d_next);
            if !denom.is_zero() {
                let t = d_current.safe_div(denom);
                out.push(current + (next - current) * t);
            }
        }
    }
    out
}

/// Face/face box-box contact generation via SAT over the six face axes
/// (edge/edge configurations are left to GJK/EPA): finds the
/// least-penetrating face axis, clips the incident face against the
/// reference face's four side planes, and emits one contact per surviving
/// vertex (spec.md section 4.4, step 2). Returns `None` when the boxes are
/// separated along a face axis (including edge/edge-separated cases), so
/// the caller falls back to the general convex path.
pub fn box_box(
    box_a: &BoxShape,
    pose_a: RigidTransform,
    box_b: &BoxShape,
    pose_b: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Option<Vec<RawCandidate>> {
    let _ = config;
    let a = oriented_box(box_a, pose_a);
    let b = oriented_box(box_b, pose_b);
    let delta = b.center - a.center;

    let candidate_axes = [a.axes[0], a.axes[1], a.axes[2], b.axes[0], b.axes[1], b.axes[2]];

    let mut best_overlap = Fix64::MAX;
    let mut best_index = 0usize;
    for (i, axis) in candidate_axes.iter().enumerate() {
        let n = match axis.normalize() {
            Some((u, _)) => u,
            None => continue,
        };
        let ra = projected_radius(&a, n);
        let rb = projected_radius(&b, n);
        let distance = delta.dot(n).abs();
        let overlap = ra.safe_add(rb).safe_sub(distance);
        if overlap < Fix64::ZERO {
            return None;
        }
        if overlap < best_overlap {
            best_overlap = overlap;
            best_index = i;
        }
    }

    let reference_is_a = best_index < 3;
    let local_index = best_index % 3;
    let (reference, incident) = if reference_is_a { (&a, &b) } else { (&b, &a) };
    let direction_to_incident = if reference_is_a { delta } else { -delta };

    let raw_axis = candidate_axes[best_index].normalize().map(|(u, _)| u)?;
    let face_normal = if raw_axis.dot(direction_to_incident) >= Fix64::ZERO { raw_axis } else { -raw_axis };
    let reference_offset = half_extent(reference.half_extents, local_index);
    let reference_plane_distance = reference.center.dot(face_normal).safe_add(reference_offset);

    let mut best_dot = Fix64::MAX;
    let mut incident_index = 0usize;
    let mut incident_sign = Fix64::ONE;
    for idx in 0..3 {
        for &sign in &[Fix64::ONE, -Fix64::ONE] {
            let d = (incident.axes[idx] * sign).dot(face_normal);
            if d < best_dot {
                best_dot = d;
                incident_index = idx;
                incident_sign = sign;
            }
        }
    }

    let incident_normal = incident.axes[incident_index] * incident_sign;
    let incident_face_center = incident.center + incident_normal * half_extent(incident.half_extents, incident_index);
    let (u_index, v_index) = ((incident_index + 1) % 3, (incident_index + 2) % 3);
    let u = incident.axes[u_index] * half_extent(incident.half_extents, u_index);
    let v = incident.axes[v_index] * half_extent(incident.half_extents, v_index);
    let mut polygon = vec![
        incident_face_center + u + v,
        incident_face_center - u + v,
        incident_face_center - u - v,
        incident_face_center + u - v,
    ];

    let (s1, s2) = ((local_index + 1) % 3, (local_index + 2) % 3);
    for side_index in [s1, s2] {
        let axis = reference.axes[side_index];
        let extent = half_extent(reference.half_extents, side_index);
        polygon = clip_polygon(polygon, axis, reference.center + axis * extent);
        polygon = clip_polygon(polygon, -axis, reference.center - axis * extent);
        if polygon.is_empty() {
            return Some(Vec::new());
        }
    }

    let mut out = Vec::with_capacity(polygon.len());
    for point in polygon {
        let depth = reference_plane_distance.safe_sub(point.dot(face_normal));
        if depth < Fix64::ZERO {
            continue;
        }
        let reference_point = point + face_normal * depth;
        let (point_a, point_b, normal) = if reference_is_a {
            (reference_point, point, face_normal)
        } else {
            (point, reference_point, -face_normal)
        };
        out.push(RawCandidate { point_a, point_b, normal, depth });
    }
    Some(out)
}
