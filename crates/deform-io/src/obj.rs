//! Wavefront OBJ reading and writing.
//!
//! Vertices keep their file order, so vertex ids in correspondence files
//! refer to the `v` lines directly. Polygons are fan-triangulated. Normals
//! and texture coordinates are per vertex: a corner's `vn`/`vt` is stored on
//! its vertex, the first assignment wins. Vertices without a normal trigger
//! a full normal recompute; UVs are kept only when every vertex has one.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use deform_math::{DVec2, DVec3};
use deform_mesh::normals::compute_vertex_normals;
use deform_mesh::TriangleMesh;
use deform_types::{DeformError, DeformResult};

/// Parsed OBJ contents before they are folded into a [`TriangleMesh`].
#[derive(Debug, Default)]
struct ObjData {
    positions: Vec<DVec3>,
    normals: Vec<DVec3>,
    texcoords: Vec<DVec2>,
    /// Per-vertex normal index, from the first corner that names one.
    vertex_normal: Vec<Option<usize>>,
    vertex_texcoord: Vec<Option<usize>>,
    indices: Vec<u32>,
    /// Corners whose `vn`/`vt` disagreed with the vertex's first one.
    conflicts: usize,
}

pub fn read_obj(path: &Path) -> DeformResult<TriangleMesh> {
    let reader = BufReader::new(File::open(path)?);
    read_obj_from(reader)
}

/// Parses OBJ text from any buffered reader.
pub fn read_obj_from<R: BufRead>(reader: R) -> DeformResult<TriangleMesh> {
    let mut data = ObjData::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        match keyword {
            "v" => {
                let p = parse_floats::<3>(&mut tokens, line_no, "v")?;
                data.positions.push(DVec3::from_array(p));
                data.vertex_normal.push(None);
                data.vertex_texcoord.push(None);
            }
            "vn" => {
                let n = parse_floats::<3>(&mut tokens, line_no, "vn")?;
                data.normals.push(DVec3::from_array(n));
            }
            "vt" => {
                let t = parse_floats::<2>(&mut tokens, line_no, "vt")?;
                data.texcoords.push(DVec2::from_array(t));
            }
            "f" => parse_face(&mut data, tokens, line_no)?,
            _ => {}
        }
    }

    if data.conflicts > 0 {
        warn!(
            corners = data.conflicts,
            "OBJ corners reference different normals/texcoords for the same vertex, first kept"
        );
    }
    debug!(
        vertices = data.positions.len(),
        normals = data.normals.len(),
        texcoords = data.texcoords.len(),
        triangles = data.indices.len() / 3,
        "OBJ parsed"
    );

    into_mesh(data)
}

fn parse_floats<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
    keyword: &str,
) -> DeformResult<[f64; N]> {
    let mut out = [0.0; N];
    for value in out.iter_mut() {
        let token = tokens.next().ok_or_else(|| DeformError::Parse {
            line,
            message: format!("'{keyword}' needs {N} components"),
        })?;
        *value = token.parse().map_err(|_| DeformError::Parse {
            line,
            message: format!("invalid number '{token}' in '{keyword}'"),
        })?;
    }
    Ok(out)
}

/// Resolves a 1-based or negative (relative) OBJ index against `count`
/// elements read so far.
fn resolve_index(token: &str, count: usize, line: usize) -> DeformResult<usize> {
    let raw: i64 = token.parse().map_err(|_| DeformError::Parse {
        line,
        message: format!("invalid index '{token}'"),
    })?;
    let index = if raw > 0 {
        raw - 1
    } else {
        count as i64 + raw
    };
    if raw == 0 || index < 0 || index >= count as i64 {
        return Err(DeformError::Parse {
            line,
            message: format!("index {raw} out of range ({count} elements)"),
        });
    }
    Ok(index as usize)
}

fn parse_face<'a>(
    data: &mut ObjData,
    tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> DeformResult<()> {
    let mut corners = Vec::with_capacity(4);
    for token in tokens {
        let mut parts = token.split('/');
        let v = resolve_index(parts.next().unwrap_or(""), data.positions.len(), line)?;
        let vt = match parts.next() {
            Some(t) if !t.is_empty() => Some(resolve_index(t, data.texcoords.len(), line)?),
            _ => None,
        };
        let vn = match parts.next() {
            Some(n) if !n.is_empty() => Some(resolve_index(n, data.normals.len(), line)?),
            _ => None,
        };

        for (slot, value) in [
            (&mut data.vertex_texcoord[v], vt),
            (&mut data.vertex_normal[v], vn),
        ] {
            match (*slot, value) {
                (None, Some(_)) => *slot = value,
                (Some(a), Some(b)) if a != b => data.conflicts += 1,
                _ => {}
            }
        }
        corners.push(v as u32);
    }

    if corners.len() < 3 {
        return Err(DeformError::Parse {
            line,
            message: format!("face has {} vertices, need at least 3", corners.len()),
        });
    }
    for k in 1..corners.len() - 1 {
        data.indices
            .extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
    }
    Ok(())
}

fn into_mesh(data: ObjData) -> DeformResult<TriangleMesh> {
    let n = data.positions.len();
    let has_uvs = n > 0 && data.vertex_texcoord.iter().all(Option::is_some);
    let has_normals = n > 0 && data.vertex_normal.iter().all(Option::is_some);

    if !has_uvs && data.vertex_texcoord.iter().any(Option::is_some) {
        warn!("Some OBJ vertices have no texture coordinate, UVs dropped");
    }

    let mut mesh = TriangleMesh::with_capacity(n, data.indices.len() / 3);
    for v in 0..n {
        let normal = match data.vertex_normal[v] {
            Some(i) if has_normals => data.normals[i],
            _ => DVec3::ZERO,
        };
        let uv = match data.vertex_texcoord[v] {
            Some(i) if has_uvs => Some(data.texcoords[i]),
            _ => None,
        };
        mesh.push_vertex(data.positions[v], normal, uv);
    }
    mesh.indices = data.indices;
    mesh.validate()?;

    if !has_normals {
        debug!("OBJ vertex normals incomplete, recomputing");
        compute_vertex_normals(&mut mesh);
    }
    Ok(mesh)
}

pub fn write_obj(path: &Path, mesh: &TriangleMesh) -> DeformResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    write_obj_to(writer, mesh)
}

/// Writes `mesh` as OBJ text. Floats use the shortest representation that
/// parses back to the same value.
pub fn write_obj_to<W: Write>(mut writer: W, mesh: &TriangleMesh) -> DeformResult<()> {
    let has_uvs = mesh.has_uvs();

    writeln!(writer, "# deform mesh")?;
    writeln!(writer, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(writer, "# Faces: {}", mesh.triangle_count())?;

    for i in 0..mesh.vertex_count() {
        let p = mesh.position(i);
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for i in 0..mesh.vertex_count() {
        let n = mesh.normal(i);
        writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    if has_uvs {
        for i in 0..mesh.vertex_count() {
            writeln!(writer, "vt {} {}", mesh.uv_u[i], mesh.uv_v[i])?;
        }
    }

    for t in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.triangle(t).map(|v| v + 1);
        if has_uvs {
            writeln!(writer, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}")?;
        } else {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        }
    }

    writer.flush()?;
    Ok(())
}
