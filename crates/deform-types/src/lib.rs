//! # deform-types
//!
//! Shared types, identifiers, error types, and solver defaults
//! for the deform mesh correspondence and deformation transfer toolkit.
//!
//! This crate has no domain logic. It defines the vocabulary
//! that all other deform crates share.

pub mod constants;
pub mod error;
pub mod ids;

pub use error::{DeformError, DeformResult};
pub use ids::{FaceId, VertexId};
