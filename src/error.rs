//! Crate-wide error type (spec.md section 7, "Error Handling Design").
//!
//! `Fix64`'s own domain errors (`sqrt` of a negative, `log` of a
//! non-positive value) are a separate, narrower type -- see
//! [`crate::math::DomainError`] -- since they can occur deep inside scalar
//! math far from any `Space` API call and are handled locally rather than
//! bubbled up through this type.

use thiserror::Error;

/// Failures surfaced by the public `Space` API (spec.md section 6/7): bad
/// arguments from the host, or a handle that no longer names a live entity.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("handle does not refer to a live entity")]
    MissingEntity,

    #[error("fixed-point domain error: {0}")]
    Domain(#[from] crate::math::DomainError),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
