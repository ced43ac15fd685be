//! # deform-solver
//!
//! Least-squares solvers built on per-face deformation gradients.
//!
//! ## Key Types
//!
//! - [`CorrespondenceResolver`]: staged deformation of a source mesh onto a
//!   target, followed by target-face → source-faces matching
//! - [`TransferSolver`]: replays source deformation gradients on a target
//!   through a prefactored sparse system
//! - [`ResolverConfig`] / [`TransferConfig`]: serde-loadable settings
//! - [`assembly::LinearSystem`]: row-by-row system builder shared by both

pub mod assembly;
pub mod config;
pub mod resolver;
pub mod transfer;

pub use config::{DeformConfig, ResolverConfig, StageWeights, TransferConfig};
pub use resolver::{CorrespondenceResolver, ResolveReport, StageReport};
pub use transfer::{TransferSolver, TransferTimings};
