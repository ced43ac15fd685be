//! Strongly-typed identifiers for mesh elements.
//!
//! Newtype wrappers prevent accidental mixing of vertex indices
//! with face indices in anchor maps and reports.

use serde::{Deserialize, Serialize};

/// Index into a mesh's vertex arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Index into a mesh's face array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl VertexId {
    /// Returns the raw index as `usize` for array indexing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VertexId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<u32> for FaceId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<usize> for VertexId {
    fn from(val: usize) -> Self {
        Self(val as u32)
    }
}

impl From<usize> for FaceId {
    fn from(val: usize) -> Self {
        Self(val as u32)
    }
}
