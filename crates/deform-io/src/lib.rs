//! # deform-io
//!
//! Mesh input/output and mesh diagnostics.
//!
//! [`read_mesh`] and [`write_mesh`] pick the format from the file
//! extension ([`MeshFormat`]): Wavefront OBJ (`.obj`) or the JSON
//! serialization of [`TriangleMesh`](deform_mesh::TriangleMesh) (`.json`).
//! [`MeshReport`] summarizes the structural health of a loaded mesh.

pub mod format;
pub mod json;
pub mod obj;
pub mod report;

pub use format::{read_mesh, write_mesh, MeshFormat};
pub use report::MeshReport;
