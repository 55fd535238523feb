//! Candidate generation for the non-convex aggregate shapes (spec.md
//! section 3: `StaticMesh`/`MobileMesh`/`Compound`/`StaticGroup`), which
//! have no support function and so cannot go through GJK/EPA directly:
//! compounds recurse per child, meshes recurse per triangle, each against
//! the other side of the pair.

use crate::geometry::{BoundingBox, Compound, Shape, Triangle, TriangleMesh};
use crate::math::RigidTransform;

use super::{generate_candidates, NarrowPhaseConfig, RawCandidate};

/// `None` when neither shape is an aggregate, meaning the caller should
/// fall through to a convex-pair path instead.
pub fn candidates(
    shape_a: &Shape,
    pose_a: RigidTransform,
    shape_b: &Shape,
    pose_b: RigidTransform,
    config: &NarrowPhaseConfig,
) -> Option<Vec<RawCandidate>> {
    match (shape_a, shape_b) {
        (Shape::Compound(c), _) | (Shape::StaticGroup(c), _) => Some(compound_side(c, pose_a, shape_b, pose_b, config, true)),
        (_, Shape::Compound(c)) | (_, Shape::StaticGroup(c)) => Some(compound_side(c, pose_b, shape_a, pose_a, config, false)),
        (Shape::StaticMesh(m), _) | (Shape::MobileMesh(m), _) => Some(mesh_side(m, pose_a, shape_b, pose_b, config, true)),
        (_, Shape::StaticMesh(m)) | (_, Shape::MobileMesh(m)) => Some(mesh_side(m, pose_b, shape_a, pose_a, config, false)),
        _ => None,
    }
}

fn compound_side(
    compound: &Compound,
    compound_pose: RigidTransform,
    other: &Shape,
    other_pose: RigidTransform,
    config: &NarrowPhaseConfig,
    compound_is_a: bool,
) -> Vec<RawCandidate> {
    let other_bounds = other.local_bounding_box(other_pose);
    let mut out = Vec::new();
    for child in &compound.children {
        let child_pose = compound_pose.compose(child.local_transform);
        let child_bounds = child.shape.local_bounding_box(child_pose);
        if !child_bounds.intersects(other_bounds) {
            continue;
        }
        let candidates = if compound_is_a {
            generate_candidates(&child.shape, child_pose, other, other_pose, config)
        } else {
            generate_candidates(other, other_pose, &child.shape, child_pose, config)
        };
        out.extend(candidates);
    }
    out
}

fn triangle_world_bounds(triangle: &Triangle, pose: RigidTransform) -> BoundingBox {
    let a = pose.transform_point(triangle.a);
    let b = pose.transform_point(triangle.b);
    let c = pose.transform_point(triangle.c);
    BoundingBox::from_point(a).merge(BoundingBox::from_point(b)).merge(BoundingBox::from_point(c))
}

fn mesh_side(
    mesh: &TriangleMesh,
    mesh_pose: RigidTransform,
    other: &Shape,
    other_pose: RigidTransform,
    config: &NarrowPhaseConfig,
    mesh_is_a: bool,
) -> Vec<RawCandidate> {
    let other_bounds = other.local_bounding_box(other_pose);
    let mut out = Vec::new();
    for index in 0..mesh.indices.len() {
        let triangle = mesh.triangle(index);
        let triangle_bounds = triangle_world_bounds(&triangle, mesh_pose);
        if !triangle_bounds.intersects(other_bounds) {
            continue;
        }
        let triangle_shape = Shape::Triangle(triangle);
        let candidates = if mesh_is_a {
            generate_candidates(&triangle_shape, mesh_pose, other, other_pose, config)
        } else {
            generate_candidates(other, other_pose, &triangle_shape, mesh_pose, config)
        };
        out.extend(candidates);
    }
    out
}
