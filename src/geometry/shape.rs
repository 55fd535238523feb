use crate::math::{Fix64, Matrix3x3, RigidTransform, Vector3};

use super::bounding_box::BoundingBox;
use super::ray::{Ray, RayHit};

/// Per-shape geometric description handed to the dynamics layer so a body
/// can scale a unit-density inertia tensor by its actual mass (spec.md
/// section 4.2).
#[derive(Copy, Clone, Debug)]
pub struct ShapeDescription {
    /// Volume, used (with density) to derive mass when the host does not
    /// supply one explicitly.
    pub volume: Fix64,
    /// The local-space inertia tensor for unit mass.
    pub unit_inertia: Matrix3x3,
    pub min_radius: Fix64,
    pub max_radius: Fix64,
    /// The shape's implicit Minkowski-sum inflation.
    pub margin: Fix64,
}

/// Sidedness of a triangle, controlling the sign of its contact normal
/// (spec.md section 4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sidedness {
    Clockwise,
    CounterClockwise,
    DoubleSided,
}

#[derive(Copy, Clone, Debug)]
pub struct Sphere {
    pub radius: Fix64,
}

#[derive(Copy, Clone, Debug)]
pub struct BoxShape {
    pub half_extents: Vector3,
}

/// A capsule with its axis along local Y.
#[derive(Copy, Clone, Debug)]
pub struct Capsule {
    pub half_height: Fix64,
    pub radius: Fix64,
}

/// A cone with apex at `+half_height` along local Y and a circular base at
/// `-half_height`.
#[derive(Copy, Clone, Debug)]
pub struct Cone {
    pub half_height: Fix64,
    pub radius: Fix64,
}

/// A cylinder with its axis along local Y.
#[derive(Copy, Clone, Debug)]
pub struct Cylinder {
    pub half_height: Fix64,
    pub radius: Fix64,
}

#[derive(Copy, Clone, Debug)]
pub struct Triangle {
    pub a: Vector3,
    pub b: Vector3,
    pub c: Vector3,
    pub sidedness: Sidedness,
}

impl Triangle {
    pub fn normal(&self) -> Vector3 {
        let n = (self.b - self.a).cross(self.c - self.a);
        n.normalize().map(|(u, _)| u).unwrap_or(Vector3::Y)
    }
}

#[derive(Clone, Debug)]
pub struct ConvexHull {
    pub points: Vec<Vector3>,
}

/// A mesh of indexed triangles. `mobile` distinguishes the two manifold
/// types named in spec.md section 3 (static vs. mobile mesh): a mobile
/// mesh additionally supports the "solid containment" ray test described
/// in spec.md section 4.4 step 5.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    pub vertices: Vec<Vector3>,
    pub indices: Vec<[u32; 3]>,
    pub mobile: bool,
    pub sidedness: Sidedness,
}

impl TriangleMesh {
    pub fn triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.indices[index];
        Triangle {
            a: self.vertices[a as usize],
            b: self.vertices[b as usize],
            c: self.vertices[c as usize],
            sidedness: self.sidedness,
        }
    }

    pub fn local_bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox::EMPTY;
        for v in &self.vertices {
            bb = bb.merge(BoundingBox::from_point(*v));
        }
        bb
    }
}

#[derive(Clone, Debug)]
pub struct CompoundChild {
    pub local_transform: RigidTransform,
    pub shape: Shape,
}

#[derive(Clone, Debug)]
pub struct Compound {
    pub children: Vec<CompoundChild>,
}

#[derive(Clone, Debug)]
pub struct TransformedShape {
    pub inner: Box<Shape>,
    pub local_transform: RigidTransform,
}

#[derive(Clone, Debug)]
pub struct MinkowskiSum {
    pub a: Box<Shape>,
    pub b: Box<Shape>,
}

/// The tagged shape variant enum (spec.md section 3). Convex primitives
/// (everything up to and including `Minkowski`) expose a support function;
/// the non-convex aggregates (`StaticMesh`, `MobileMesh`, `Compound`,
/// `StaticGroup`) are handled per-child/per-triangle by the narrow phase
/// instead.
#[derive(Clone, Debug)]
pub enum Shape {
    Sphere(Sphere),
    Box(BoxShape),
    Capsule(Capsule),
    Cone(Cone),
    Cylinder(Cylinder),
    Triangle(Triangle),
    ConvexHull(ConvexHull),
    Transformed(TransformedShape),
    Minkowski(MinkowskiSum),
    StaticMesh(TriangleMesh),
    MobileMesh(TriangleMesh),
    Compound(Compound),
    StaticGroup(Compound),
}

impl Shape {
    pub fn is_convex(&self) -> bool {
        !matches!(
            self,
            Shape::StaticMesh(_) | Shape::MobileMesh(_) | Shape::Compound(_) | Shape::StaticGroup(_)
        )
    }

    /// The extreme point in local space along `dir`, without the margin
    /// added (spec.md section 4.2). `None` for non-convex aggregates.
    pub fn support_local(&self, dir: Vector3) -> Option<Vector3> {
        match self {
            Shape::Sphere(_) => Some(Vector3::ZERO),
            Shape::Box(b) => Some(Vector3::new(
                sign_extreme(dir.x, b.half_extents.x),
                sign_extreme(dir.y, b.half_extents.y),
                sign_extreme(dir.z, b.half_extents.z),
            )),
            Shape::Capsule(c) => {
                let sign = if dir.y.raw() >= 0 { Fix64::ONE } else { -Fix64::ONE };
                Some(Vector3::new(Fix64::ZERO, sign.safe_mul(c.half_height), Fix64::ZERO))
            }
            Shape::Cone(c) => {
                // Compare support at the apex versus the base rim.
                let apex = Vector3::new(Fix64::ZERO, c.half_height, Fix64::ZERO);
                let rim_xz = Vector3::new(dir.x, Fix64::ZERO, dir.z);
                let rim = match rim_xz.normalize() {
                    Some((n, _)) => Vector3::new(n.x.safe_mul(c.radius), -c.half_height, n.z.safe_mul(c.radius)),
                    None => Vector3::new(c.radius, -c.half_height, Fix64::ZERO),
                };
                if apex.dot(dir) >= rim.dot(dir) {
                    Some(apex)
                } else {
                    Some(rim)
                }
            }
            Shape::Cylinder(c) => {
                let sign = if dir.y.raw() >= 0 { Fix64::ONE } else { -Fix64::ONE };
                let xz = Vector3::new(dir.x, Fix64::ZERO, dir.z);
                let rim = match xz.normalize() {
                    Some((n, _)) => Vector3::new(n.x.safe_mul(c.radius), Fix64::ZERO, n.z.safe_mul(c.radius)),
                    None => Vector3::ZERO,
                };
                Some(Vector3::new(rim.x, sign.safe_mul(c.half_height), rim.z))
            }
            Shape::Triangle(t) => {
                let pts = [t.a, t.b, t.c];
                Some(extreme_point(&pts, dir))
            }
            Shape::ConvexHull(h) => Some(extreme_point(&h.points, dir)),
            Shape::Transformed(t) => {
                let local_dir = t.local_transform.orientation.conjugate().rotate(dir);
                t.inner.support_local(local_dir).map(|p| t.local_transform.transform_point(p))
            }
            Shape::Minkowski(m) => {
                let a = m.a.support_local(dir)?;
                let b = m.b.support_local(dir)?;
                Some(a + b)
            }
            Shape::StaticMesh(_) | Shape::MobileMesh(_) | Shape::Compound(_) | Shape::StaticGroup(_) => None,
        }
    }

    /// The margin-inflated support point: `support_local(dir) + margin * dir_hat`.
    pub fn support_with_margin(&self, dir: Vector3) -> Option<Vector3> {
        let base = self.support_local(dir)?;
        let margin = self.description().margin;
        if margin.is_zero() {
            return Some(base);
        }
        match dir.normalize() {
            Some((n, _)) => Some(base + n * margin),
            None => Some(base),
        }
    }

    pub fn description(&self) -> ShapeDescription {
        match self {
            Shape::Sphere(s) => {
                let r = s.radius;
                let unit_i = Fix64::from_ratio(2, 5).safe_mul(r).safe_mul(r);
                ShapeDescription {
                    volume: Fix64::from_ratio(4, 3).safe_mul(Fix64::PI).safe_mul(r).safe_mul(r).safe_mul(r),
                    unit_inertia: Matrix3x3::from_diagonal(Vector3::splat(unit_i)),
                    min_radius: r,
                    max_radius: r,
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Box(b) => {
                let e = b.half_extents;
                let (w, h, d) = (e.x.safe_mul(Fix64::TWO), e.y.safe_mul(Fix64::TWO), e.z.safe_mul(Fix64::TWO));
                let twelfth = Fix64::from_ratio(1, 12);
                let ixx = twelfth.safe_mul(h.safe_mul(h).safe_add(d.safe_mul(d)));
                let iyy = twelfth.safe_mul(w.safe_mul(w).safe_add(d.safe_mul(d)));
                let izz = twelfth.safe_mul(w.safe_mul(w).safe_add(h.safe_mul(h)));
                let diagonal = Vector3::new(e.x, e.y, e.z).length().unwrap_or(e.x.max(e.y).max(e.z));
                ShapeDescription {
                    volume: w.safe_mul(h).safe_mul(d),
                    unit_inertia: Matrix3x3::from_diagonal(Vector3::new(ixx, iyy, izz)),
                    min_radius: e.x.min(e.y).min(e.z),
                    max_radius: diagonal,
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Capsule(c) => {
                let r = c.radius;
                let h = c.half_height.safe_mul(Fix64::TWO);
                let cyl_volume = Fix64::PI.safe_mul(r).safe_mul(r).safe_mul(h);
                let cap_volume = Fix64::from_ratio(4, 3).safe_mul(Fix64::PI).safe_mul(r).safe_mul(r).safe_mul(r);
                let iyy = Fix64::HALF.safe_mul(r).safe_mul(r);
                let ixx = Fix64::from_ratio(1, 12).safe_mul(h.safe_mul(h)).safe_add(Fix64::from_ratio(1, 4).safe_mul(r).safe_mul(r));
                ShapeDescription {
                    volume: cyl_volume.safe_add(cap_volume),
                    unit_inertia: Matrix3x3::from_diagonal(Vector3::new(ixx, iyy, ixx)),
                    min_radius: r,
                    max_radius: c.half_height.safe_add(r),
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Cylinder(c) => {
                let r = c.radius;
                let h = c.half_height.safe_mul(Fix64::TWO);
                let iyy = Fix64::HALF.safe_mul(r).safe_mul(r);
                let ixx = Fix64::from_ratio(1, 12).safe_mul(h.safe_mul(h)).safe_add(Fix64::from_ratio(1, 4).safe_mul(r).safe_mul(r));
                let radial = Vector3::new(r, c.half_height, Fix64::ZERO).length().unwrap_or(c.half_height.max(r));
                ShapeDescription {
                    volume: Fix64::PI.safe_mul(r).safe_mul(r).safe_mul(h),
                    unit_inertia: Matrix3x3::from_diagonal(Vector3::new(ixx, iyy, ixx)),
                    min_radius: r.min(c.half_height),
                    max_radius: radial,
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Cone(c) => {
                let r = c.radius;
                let h = c.half_height.safe_mul(Fix64::TWO);
                let iyy = Fix64::from_ratio(3, 10).safe_mul(r).safe_mul(r);
                let ixx = Fix64::from_ratio(3, 20).safe_mul(r).safe_mul(r).safe_add(Fix64::from_ratio(3, 80).safe_mul(h).safe_mul(h));
                let slant = Vector3::new(r, h, Fix64::ZERO).length().unwrap_or(h);
                ShapeDescription {
                    volume: Fix64::from_ratio(1, 3).safe_mul(Fix64::PI).safe_mul(r).safe_mul(r).safe_mul(h),
                    unit_inertia: Matrix3x3::from_diagonal(Vector3::new(ixx, iyy, ixx)),
                    min_radius: r.min(c.half_height),
                    max_radius: slant.safe_mul(Fix64::HALF),
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Triangle(_) => ShapeDescription {
                volume: Fix64::ZERO,
                unit_inertia: Matrix3x3::ZERO,
                min_radius: Fix64::ZERO,
                max_radius: Fix64::from_i32(1_000_000),
                margin: DEFAULT_MARGIN,
            },
            Shape::ConvexHull(h) => {
                let mut max_r = Fix64::ZERO;
                let mut min_r = Fix64::MAX;
                for p in &h.points {
                    let len = p.length().unwrap_or(Fix64::ZERO);
                    max_r = max_r.max(len);
                    min_r = min_r.min(len);
                }
                ShapeDescription {
                    volume: Fix64::ZERO,
                    unit_inertia: Matrix3x3::IDENTITY,
                    min_radius: if min_r == Fix64::MAX { Fix64::ZERO } else { min_r },
                    max_radius: max_r,
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Transformed(t) => t.inner.description(),
            Shape::Minkowski(m) => {
                let a = m.a.description();
                let b = m.b.description();
                ShapeDescription {
                    volume: a.volume.safe_add(b.volume),
                    unit_inertia: a.unit_inertia,
                    min_radius: a.min_radius.safe_add(b.min_radius),
                    max_radius: a.max_radius.safe_add(b.max_radius),
                    margin: a.margin.max(b.margin),
                }
            }
            Shape::StaticMesh(m) | Shape::MobileMesh(m) => {
                let bb = m.local_bounding_box();
                ShapeDescription {
                    volume: Fix64::ZERO,
                    unit_inertia: Matrix3x3::IDENTITY,
                    min_radius: Fix64::ZERO,
                    max_radius: bb.extents().length().unwrap_or(Fix64::ZERO),
                    margin: DEFAULT_MARGIN,
                }
            }
            Shape::Compound(c) | Shape::StaticGroup(c) => {
                let mut volume = Fix64::ZERO;
                let mut max_r = Fix64::ZERO;
                for child in &c.children {
                    let d = child.shape.description();
                    volume = volume.safe_add(d.volume);
                    let offset = child.local_transform.position.length().unwrap_or(Fix64::ZERO);
                    max_r = max_r.max(offset.safe_add(d.max_radius));
                }
                ShapeDescription {
                    volume,
                    unit_inertia: Matrix3x3::IDENTITY,
                    min_radius: Fix64::ZERO,
                    max_radius: max_r,
                    margin: DEFAULT_MARGIN,
                }
            }
        }
    }

    pub fn local_bounding_box(&self, transform: RigidTransform) -> BoundingBox {
        match self {
            Shape::StaticMesh(m) | Shape::MobileMesh(m) => m.local_bounding_box().transformed(transform),
            Shape::Compound(c) | Shape::StaticGroup(c) => {
                let mut bb = BoundingBox::EMPTY;
                for child in &c.children {
                    let child_world = transform.compose(child.local_transform);
                    bb = bb.merge(child.shape.local_bounding_box(child_world));
                }
                bb
            }
            _ => {
                let desc = self.description();
                let r = desc.max_radius.safe_add(desc.margin);
                let extents = Vector3::splat(r);
                BoundingBox::new(transform.position - extents, transform.position + extents)
            }
        }
    }

    pub fn ray_test(&self, ray: &Ray, max_t: Fix64) -> Option<RayHit> {
        super::ray::ray_test_shape(self, ray, max_t)
    }
}

/// Used by `Box::support_local`: the extreme coordinate along a single axis.
fn sign_extreme(dir_component: Fix64, half_extent: Fix64) -> Fix64 {
    if dir_component.raw() >= 0 {
        half_extent
    } else {
        -half_extent
    }
}

pub(crate) fn extreme_point(points: &[Vector3], dir: Vector3) -> Vector3 {
    let mut best = points[0];
    let mut best_dot = best.dot(dir);
    for p in &points[1..] {
        let d = p.dot(dir);
        if d > best_dot {
            best_dot = d;
            best = *p;
        }
    }
    best
}

/// Default collision margin (spec.md section 6, `default_margin`).
pub const DEFAULT_MARGIN: Fix64 = Fix64::from_raw(171_798_691); // 0.04

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_support_is_center() {
        let s = Shape::Sphere(Sphere { radius: Fix64::ONE });
        assert_eq!(s.support_local(Vector3::X), Some(Vector3::ZERO));
    }

    #[test]
    fn box_support_picks_correct_corner() {
        let b = Shape::Box(BoxShape { half_extents: Vector3::splat(Fix64::ONE) });
        let support = b.support_local(Vector3::new(Fix64::ONE, -Fix64::ONE, Fix64::ONE)).unwrap();
        assert_eq!(support, Vector3::new(Fix64::ONE, -Fix64::ONE, Fix64::ONE));
    }

    #[test]
    fn mesh_has_no_support() {
        let m = Shape::StaticMesh(TriangleMesh {
            vertices: vec![Vector3::ZERO, Vector3::X, Vector3::Y],
            indices: vec![[0, 1, 2]],
            mobile: false,
            sidedness: Sidedness::DoubleSided,
        });
        assert!(m.support_local(Vector3::X).is_none());
        assert!(!m.is_convex());
    }
}
