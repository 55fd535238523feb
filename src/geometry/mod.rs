//! Shapes, bounding volumes, and the convex-convex distance/penetration
//! queries built on top of them (spec.md section 4.2 and 4.4).

mod bounding_box;
mod epa;
mod gjk;
mod ray;
mod shape;

pub use bounding_box::BoundingBox;
pub use epa::{epa, PenetrationInfo};
pub use gjk::{gjk, GjkResult};
pub use ray::{Ray, RayHit};
pub use shape::{
    BoxShape, Capsule, Compound, CompoundChild, Cone, ConvexHull, Cylinder, MinkowskiSum,
    Shape, ShapeDescription, Sidedness, Sphere, Triangle, TransformedShape, TriangleMesh,
    DEFAULT_MARGIN,
};
