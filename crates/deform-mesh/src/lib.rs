//! # deform-mesh
//!
//! Triangle mesh representation with Structure-of-Arrays (SoA) layout.
//!
//! ## Key Types
//!
//! - [`TriangleMesh`]: The core mesh type. Stores positions, normals, optional
//!   UVs, and triangle indices in contiguous SoA buffers.
//! - [`Topology`]: Adjacency queries (vertex-to-triangle, edge neighbors,
//!   face neighbors in a stable order).
//! - Procedural generators for tests (quad grids, UV spheres, a two-triangle strip).

pub mod generators;
pub mod mesh;
pub mod normals;
pub mod topology;

pub use mesh::TriangleMesh;
pub use topology::Topology;
