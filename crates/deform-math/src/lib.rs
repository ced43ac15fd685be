//! # deform-math
//!
//! Linear algebra primitives for the deform toolkit.
//!
//! Provides:
//! - Re-exports of `glam` double-precision types (`DVec3`, `DMat3`, etc.)
//! - Triangle geometry: surface matrices, deformation gradients, and the
//!   9×4 gradient-transfer operator shared by both solvers
//! - Sparse matrix representation (CSR) and Cholesky solver interface

pub mod faer_solver;
pub mod geometry;
pub mod sparse;

// Re-export glam types as the canonical math types for deform.
pub use glam::{DMat3, DQuat, DVec2, DVec3};
