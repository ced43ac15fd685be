//! Anchor (constraint) maps for the correspondence resolver.
//!
//! An anchor pins a source-mesh vertex to a position taken from the
//! target reference mesh. The map is built once from a hand-authored
//! vertex correspondence and stays immutable for the whole resolve.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use deform_math::{DVec2, DVec3};
use deform_mesh::TriangleMesh;
use deform_types::constants::BARYCENTRIC_EPSILON;
use deform_types::{DeformError, DeformResult, VertexId};

use crate::container::Correspondence;

/// Source vertex → fixed position, ordered by vertex id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintMap {
    anchors: BTreeMap<VertexId, DVec3>,
}

impl ConstraintMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `vertex` to `position`, replacing any earlier anchor.
    pub fn insert(&mut self, vertex: VertexId, position: DVec3) {
        self.anchors.insert(vertex, position);
    }

    /// Anchor position of `vertex`.
    pub fn get(&self, vertex: VertexId) -> Option<DVec3> {
        self.anchors.get(&vertex).copied()
    }

    /// Returns true if `vertex` is anchored.
    pub fn contains(&self, vertex: VertexId) -> bool {
        self.anchors.contains_key(&vertex)
    }

    /// Number of anchored vertices.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Returns true if nothing is anchored.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Anchors in ascending vertex order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, DVec3)> + '_ {
        self.anchors.iter().map(|(&v, &p)| (v, p))
    }

    /// Fails if any anchored vertex is outside `[0, vertex_count)`.
    pub fn validate(&self, vertex_count: usize) -> DeformResult<()> {
        match self.anchors.keys().find(|v| v.index() >= vertex_count) {
            Some(v) => Err(DeformError::InvalidCorrespondence(format!(
                "Anchored vertex {} out of range (vertex count: {})",
                v.0, vertex_count
            ))),
            None => Ok(()),
        }
    }
}

/// Anchors each corresponded source vertex at the position of its target
/// vertex.
///
/// When a source vertex lists several targets the last one wins.
pub fn build_constraints(
    pairs: &Correspondence,
    source: &TriangleMesh,
    target: &TriangleMesh,
) -> DeformResult<ConstraintMap> {
    let mut map = ConstraintMap::new();
    for (s, t) in pairs.pairs() {
        check_vertex(s, source, "source")?;
        check_vertex(t, target, "target")?;
        map.insert(VertexId::from(s), target.position(t));
    }

    info!(
        constrained = map.len(),
        free = source.vertex_count() - map.len(),
        "Vertex constraints"
    );
    Ok(map)
}

/// Anchors each corresponded source vertex by locating its texture
/// coordinate inside the target's UV triangles and interpolating the
/// containing target face's positions.
///
/// Only the source ids of `pairs` are used. Vertices whose UV falls
/// outside every target UV triangle are skipped and returned.
pub fn build_constraints_from_uv(
    pairs: &Correspondence,
    source: &TriangleMesh,
    target: &TriangleMesh,
) -> DeformResult<(ConstraintMap, Vec<VertexId>)> {
    if !source.has_uvs() {
        return Err(DeformError::InvalidMesh(
            "Source mesh has no texture coordinates".into(),
        ));
    }
    if !target.has_uvs() {
        return Err(DeformError::InvalidMesh(
            "Target mesh has no texture coordinates".into(),
        ));
    }

    let vertices: Vec<usize> = pairs.entries().map(|(s, _)| s).collect();
    for &v in &vertices {
        check_vertex(v, source, "source")?;
    }

    let located: Vec<Option<DVec3>> = vertices
        .par_iter()
        .map(|&v| {
            let uv = source.uv(v)?;
            locate_uv(target, uv)
        })
        .collect();

    let mut map = ConstraintMap::new();
    let mut unlocated = Vec::new();
    for (&v, position) in vertices.iter().zip(located) {
        match position {
            Some(p) => map.insert(VertexId::from(v), p),
            None => {
                warn!(vertex = v, "UV outside every target triangle, anchor skipped");
                unlocated.push(VertexId::from(v));
            }
        }
    }

    info!(
        constrained = map.len(),
        unlocated = unlocated.len(),
        "UV vertex constraints"
    );
    Ok((map, unlocated))
}

/// Position on `mesh` whose texture coordinate is `uv`, taken from the
/// lowest-index face whose UV triangle contains it.
fn locate_uv(mesh: &TriangleMesh, uv: DVec2) -> Option<DVec3> {
    (0..mesh.triangle_count()).find_map(|t| {
        let [a, b, c] = mesh.triangle(t).map(|v| v as usize);
        let w = barycentric(uv, mesh.uv(a)?, mesh.uv(b)?, mesh.uv(c)?)?;
        Some(mesh.position(a) * w[0] + mesh.position(b) * w[1] + mesh.position(c) * w[2])
    })
}

/// Barycentric coordinates of `p` in triangle `(a, b, c)`, or `None` when
/// the triangle is degenerate or does not contain `p`.
fn barycentric(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let den = v0.perp_dot(v1);
    if den.abs() <= f64::EPSILON * v0.length_squared().max(v1.length_squared()) {
        return None;
    }
    let l1 = v2.perp_dot(v1) / den;
    let l2 = v0.perp_dot(v2) / den;
    let l0 = 1.0 - l1 - l2;
    let inside = [l0, l1, l2].iter().all(|&l| l >= -BARYCENTRIC_EPSILON);
    inside.then_some([l0, l1, l2])
}

fn check_vertex(v: usize, mesh: &TriangleMesh, which: &str) -> DeformResult<()> {
    if v >= mesh.vertex_count() {
        return Err(DeformError::InvalidCorrespondence(format!(
            "{} vertex {} out of range (vertex count: {})",
            which,
            v,
            mesh.vertex_count()
        )));
    }
    Ok(())
}
