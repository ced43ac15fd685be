//! # deform-correspondence
//!
//! Element-to-element correspondences between meshes.
//!
//! ## Key Types
//!
//! - [`Correspondence`]: id → ordered id list, backed by one of three
//!   strategies ([`CorrespondenceKind`]).
//! - [`ConstraintMap`]: source vertex → fixed target-space position,
//!   the anchors of a correspondence resolve.
//!
//! Builders derive face adjacency, nearest-vertex lookups, and face
//! correspondences from meshes and a [`SpatialIndex`](deform_search::SpatialIndex).

pub mod anchors;
pub mod build;
pub mod container;
pub mod format;

pub use anchors::ConstraintMap;
pub use build::{FaceMatchOptions, FaceMatchSummary};
pub use container::{Correspondence, CorrespondenceKind};
