//! JSON serialization of [`TriangleMesh`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use deform_mesh::TriangleMesh;
use deform_types::{DeformError, DeformResult};

pub fn read_json(path: &Path) -> DeformResult<TriangleMesh> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader)
        .map_err(|e| DeformError::Serialization(format!("{}: {e}", path.display())))
}

pub fn write_json(path: &Path, mesh: &TriangleMesh) -> DeformResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, mesh)
        .map_err(|e| DeformError::Serialization(format!("{}: {e}", path.display())))?;
    writer.flush()?;
    Ok(())
}
