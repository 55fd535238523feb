//! The fixed-point scalar and geometric-primitive layer (spec.md section 4.1).
//!
//! Everything downstream of this module operates exclusively on [`Fix64`]
//! and the types built on top of it, so that a tick produces byte-identical
//! output on every target platform.

mod fixed;
mod lut_data;
mod matrix;
mod quaternion;
mod vector;
mod transform;

pub use fixed::{DomainError, Fix64, FRAC_BITS};
pub use matrix::Matrix3x3;
pub use quaternion::Quaternion;
pub use transform::RigidTransform;
pub use vector::Vector3;
