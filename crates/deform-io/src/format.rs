//! Format detection and dispatch.

use std::path::Path;

use tracing::info;

use deform_mesh::TriangleMesh;
use deform_types::{DeformError, DeformResult};

use crate::{json, obj};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Json,
}

impl MeshFormat {
    /// Detects the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> DeformResult<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        match ext.as_deref() {
            Some("obj") => Ok(MeshFormat::Obj),
            Some("json") => Ok(MeshFormat::Json),
            Some(other) => Err(DeformError::UnsupportedFormat(format!(
                "'.{other}' ({})",
                path.display()
            ))),
            None => Err(DeformError::UnsupportedFormat(format!(
                "no file extension ({})",
                path.display()
            ))),
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Json => "json",
        }
    }
}

/// Loads a mesh, choosing the reader from the extension. The result is
/// validated before it is returned.
pub fn read_mesh(path: impl AsRef<Path>) -> DeformResult<TriangleMesh> {
    let path = path.as_ref();
    let format = MeshFormat::from_path(path)?;

    let mesh = match format {
        MeshFormat::Obj => obj::read_obj(path)?,
        MeshFormat::Json => json::read_json(path)?,
    };
    mesh.validate()?;

    info!(
        path = %path.display(),
        ?format,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "Loaded mesh"
    );
    Ok(mesh)
}

/// Saves a mesh, choosing the writer from the extension.
pub fn write_mesh(path: impl AsRef<Path>, mesh: &TriangleMesh) -> DeformResult<()> {
    let path = path.as_ref();
    let format = MeshFormat::from_path(path)?;

    match format {
        MeshFormat::Obj => obj::write_obj(path, mesh)?,
        MeshFormat::Json => json::write_json(path, mesh)?,
    }

    info!(
        path = %path.display(),
        ?format,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "Saved mesh"
    );
    Ok(())
}
