use crate::math::{Fix64, Vector3};

use super::shape::{Shape, Sidedness, Triangle};

/// A world-space ray: `origin + direction * t` for `t` in `[0, max_t]`.
/// `direction` is expected to be a unit vector.
#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

impl Ray {
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Ray { origin, direction }
    }

    pub fn point_at(self, t: Fix64) -> Vector3 {
        self.origin + self.direction * t
    }
}

#[derive(Copy, Clone, Debug)]
pub struct RayHit {
    pub t: Fix64,
    pub point: Vector3,
    pub normal: Vector3,
}

/// Small tolerance used by the support-function ray cast and triangle tests
/// below; expressed in raw Q31.32 units rather than a host float literal.
const EPSILON: Fix64 = Fix64::from_raw(4_295); // ~ 1e-6

pub(crate) fn ray_test_shape(shape: &Shape, ray: &Ray, max_t: Fix64) -> Option<RayHit> {
    match shape {
        Shape::Sphere(s) => ray_sphere(ray, Vector3::ZERO, s.radius, max_t),
        Shape::Box(b) => ray_box(ray, b.half_extents, max_t),
        Shape::Triangle(t) => ray_triangle(ray, t, max_t),
        Shape::StaticMesh(mesh) | Shape::MobileMesh(mesh) => ray_mesh(ray, mesh, max_t),
        Shape::Compound(c) | Shape::StaticGroup(c) => {
            let mut best: Option<RayHit> = None;
            for child in &c.children {
                let local_ray = Ray::new(
                    child.local_transform.inverse_transform_point(ray.origin),
                    child.local_transform.orientation.conjugate().rotate(ray.direction),
                );
                let bound = best.map(|h| h.t).unwrap_or(max_t);
                if let Some(hit) = ray_test_shape(&child.shape, &local_ray, bound) {
                    let world_point = child.local_transform.transform_point(hit.point);
                    let world_normal = child.local_transform.transform_vector(hit.normal);
                    best = Some(RayHit { t: hit.t, point: world_point, normal: world_normal });
                }
            }
            best
        }
        // Convex primitives without a closed-form test fall back to the
        // generic support-function ray cast (spec.md section 4.4: "every
        // convex shape supports ray casting through its support function").
        _ => ray_convex_support(shape, ray, max_t),
    }
}

fn ray_sphere(ray: &Ray, center: Vector3, radius: Fix64, max_t: Fix64) -> Option<RayHit> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared().safe_sub(radius.safe_mul(radius));
    let discriminant = b.safe_mul(b).safe_sub(c);
    if discriminant.raw() < 0 {
        return None;
    }
    let sqrt_disc = discriminant.sqrt().ok()?;
    let t0 = -b.safe_sub(sqrt_disc);
    let t1 = -b.safe_add(sqrt_disc);
    let t = if t0.raw() >= 0 {
        t0
    } else if t1.raw() >= 0 {
        t1
    } else {
        return None;
    };
    if t.raw() < 0 || t > max_t {
        return None;
    }
    let point = ray.point_at(t);
    let normal = (point - center).normalize().map(|(n, _)| n).unwrap_or(Vector3::Y);
    Some(RayHit { t, point, normal })
}

fn ray_box(ray: &Ray, half_extents: Vector3, max_t: Fix64) -> Option<RayHit> {
    let mut t_min = Fix64::ZERO;
    let mut t_max = max_t;
    let mut normal = Vector3::ZERO;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        let dir = ray.direction[axis];
        let extent = half_extents[axis];

        if dir.is_zero() {
            if origin < -extent || origin > extent {
                return None;
            }
            continue;
        }

        let inv_dir = Fix64::ONE.safe_div(dir);
        let mut t0 = (-extent - origin).safe_mul(inv_dir);
        let mut t1 = (extent - origin).safe_mul(inv_dir);
        let mut sign = Fix64::ONE;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = -Fix64::ONE;
        }
        if t0 > t_min {
            t_min = t0;
            normal = Vector3::ZERO;
            normal[axis] = -sign;
        }
        if t1 < t_max {
            t_max = t1;
        }
        if t_min > t_max {
            return None;
        }
    }

    if t_min.raw() < 0 || t_min > max_t {
        return None;
    }
    Some(RayHit { t: t_min, point: ray.point_at(t_min), normal })
}

/// Moller-Trumbore ray/triangle intersection.
fn ray_triangle(ray: &Ray, tri: &Triangle, max_t: Fix64) -> Option<RayHit> {
    let edge1 = tri.b - tri.a;
    let edge2 = tri.c - tri.a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);

    let backface = det.raw() < 0;
    if tri.sidedness == Sidedness::CounterClockwise && backface {
        return None;
    }
    if tri.sidedness == Sidedness::Clockwise && !backface {
        return None;
    }
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = Fix64::ONE.safe_div(det);
    let t_vec = ray.origin - tri.a;
    let u = t_vec.dot(p).safe_mul(inv_det);
    if u.raw() < 0 || u > Fix64::ONE {
        return None;
    }

    let q = t_vec.cross(edge1);
    let v = ray.direction.dot(q).safe_mul(inv_det);
    if v.raw() < 0 || u.safe_add(v) > Fix64::ONE {
        return None;
    }

    let t = edge2.dot(q).safe_mul(inv_det);
    if t.raw() < 0 || t > max_t {
        return None;
    }

    Some(RayHit { t, point: ray.point_at(t), normal: tri.normal() })
}

fn ray_mesh(ray: &Ray, mesh: &super::shape::TriangleMesh, max_t: Fix64) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;
    for i in 0..mesh.indices.len() {
        let tri = mesh.triangle(i);
        let bound = best.map(|h| h.t).unwrap_or(max_t);
        if let Some(hit) = ray_triangle(ray, &tri, bound) {
            best = Some(hit);
        }
    }
    best
}

/// Ray cast against any convex shape using only its support function (Gino
/// van den Bergen's conservative-advancement algorithm). Used for shapes
/// without a closed-form test: capsule, cylinder, cone, convex hull, and the
/// `Transformed`/`Minkowski` wrappers.
fn ray_convex_support(shape: &Shape, ray: &Ray, max_t: Fix64) -> Option<RayHit> {
    const MAX_ITERATIONS: usize = 64;

    let mut lambda = Fix64::ZERO;
    let mut x = ray.origin;
    let mut normal = Vector3::ZERO;

    let mut v = x - shape.support_with_margin(-ray.direction)?;

    for _ in 0..MAX_ITERATIONS {
        let p = shape.support_with_margin(v)?;
        let w = x - p;
        let v_dot_w = v.dot(w);
        if v_dot_w.raw() > 0 {
            let v_dot_d = v.dot(ray.direction);
            if v_dot_d.raw() >= 0 {
                return None;
            }
            lambda = lambda.safe_sub(v_dot_w.safe_div(v_dot_d));
            if lambda > max_t {
                return None;
            }
            x = ray.point_at(lambda);
            normal = v;
        }
        let new_v = x - p;
        if new_v.length_squared() < EPSILON {
            let unit_normal = normal.normalize().map(|(n, _)| n).unwrap_or(-ray.direction);
            return Some(RayHit { t: lambda, point: x, normal: unit_normal });
        }
        v = new_v;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::shape::{BoxShape, Sphere};

    #[test]
    fn ray_hits_sphere_head_on() {
        let ray = Ray::new(Vector3::new(-Fix64::from_i32(5), Fix64::ZERO, Fix64::ZERO), Vector3::X);
        let hit = ray_sphere(&ray, Vector3::ZERO, Fix64::ONE, Fix64::from_i32(100)).unwrap();
        assert!((hit.t.to_f64() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn ray_misses_sphere() {
        let ray = Ray::new(Vector3::new(-Fix64::from_i32(5), Fix64::from_i32(3), Fix64::ZERO), Vector3::X);
        assert!(ray_sphere(&ray, Vector3::ZERO, Fix64::ONE, Fix64::from_i32(100)).is_none());
    }

    #[test]
    fn ray_hits_box_face() {
        let ray = Ray::new(Vector3::new(Fix64::ZERO, Fix64::from_i32(5), Fix64::ZERO), -Vector3::Y);
        let hit = ray_box(&ray, Vector3::splat(Fix64::ONE), Fix64::from_i32(100)).unwrap();
        assert!((hit.t.to_f64() - 4.0).abs() < 1e-3);
        assert_eq!(hit.normal, Vector3::Y);
    }

    #[test]
    fn convex_support_cast_matches_sphere() {
        let shape = Shape::Sphere(Sphere { radius: Fix64::ONE });
        let ray = Ray::new(Vector3::new(-Fix64::from_i32(5), Fix64::ZERO, Fix64::ZERO), Vector3::X);
        let hit = ray_convex_support(&shape, &ray, Fix64::from_i32(100)).unwrap();
        assert!((hit.t.to_f64() - 4.0).abs() < 1e-2);
    }

    #[test]
    fn box_shape_ray_test_dispatches() {
        let shape = Shape::Box(BoxShape { half_extents: Vector3::splat(Fix64::ONE) });
        let ray = Ray::new(Vector3::new(Fix64::ZERO, Fix64::ZERO, -Fix64::from_i32(5)), Vector3::Z);
        assert!(shape.ray_test(&ray, Fix64::from_i32(100)).is_some());
    }
}
