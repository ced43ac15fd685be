//! # deform-search
//!
//! Static nearest-neighbour index over mesh vertices or face centroids.
//!
//! Each element may carry a normal. Queries that pass a normal only
//! accept elements facing the same way (positive dot product), which
//! keeps the front and back of thin shells from matching each other.

pub mod index;

pub use index::{SearchHit, SpatialIndex};
