//! Correspondence builders.
//!
//! Searches over independent elements run on rayon; per-element results
//! are collected by index and inserted in index order, so the output does
//! not depend on scheduling.

use rayon::prelude::*;
use tracing::{info, warn};

use deform_math::DVec3;
use deform_mesh::normals::{face_centroid, face_normal};
use deform_mesh::{Topology, TriangleMesh};
use deform_search::SpatialIndex;
use deform_types::constants::DEFAULT_MAX_CORRESPONDENCES;
use deform_types::{DeformResult, FaceId};

use crate::container::Correspondence;

/// Face → edge-adjacent faces, in face-edge order.
pub fn build_face_adjacency(mesh: &TriangleMesh) -> DeformResult<Correspondence> {
    let topology = Topology::build(mesh);
    let mut corr = Correspondence::dense_multi(mesh.triangle_count());
    for (face, neighbors) in topology.face_neighbors.iter().enumerate() {
        for &n in neighbors {
            corr.add(face, n as usize)?;
        }
    }
    Ok(corr)
}

/// Vertex of `mesh` → nearest element of `index`.
///
/// Queries carry the vertex normal, so an index built with normals only
/// returns elements facing the same way. Vertices with a zero normal are
/// skipped.
pub fn build_nearest_vertex(
    mesh: &TriangleMesh,
    index: &SpatialIndex,
) -> DeformResult<Correspondence> {
    let nearest: Vec<Option<usize>> = (0..mesh.vertex_count())
        .into_par_iter()
        .map(|v| {
            let normal = mesh.normal(v);
            if normal == DVec3::ZERO {
                warn!(vertex = v, "Invalid normal, skipping nearest search");
                return None;
            }
            index.nearest(mesh.position(v), Some(normal)).map(|h| h.index)
        })
        .collect();

    let mut corr = Correspondence::dense_single(mesh.vertex_count());
    for (v, target) in nearest.into_iter().enumerate() {
        if let Some(t) = target {
            corr.add(v, t)?;
        }
    }
    Ok(corr)
}

/// Search radius of a mesh: `sqrt(4 · diagonal² / vertex_count)`.
///
/// Roughly twice the mean vertex spacing of a mesh spread over its
/// bounding box. Zero for an empty mesh.
pub fn mesh_threshold(mesh: &TriangleMesh) -> f64 {
    let n = mesh.vertex_count();
    if n == 0 {
        return 0.0;
    }
    let diag = mesh.diagonal();
    (4.0 * diag * diag / n as f64).sqrt()
}

/// The smaller of the two meshes' thresholds.
pub fn pair_threshold(a: &TriangleMesh, b: &TriangleMesh) -> f64 {
    mesh_threshold(a).min(mesh_threshold(b))
}

/// Parameters of [`build_face_correspondence`].
#[derive(Debug, Clone, Copy)]
pub struct FaceMatchOptions {
    /// Search radius around each target face centroid.
    pub radius: f64,
    /// Maximum matches kept per target face (0 keeps all).
    pub max_correspondences: usize,
    /// Use the nearest facing source face when nothing lies within `radius`.
    pub fallback_to_nearest: bool,
}

impl FaceMatchOptions {
    /// Defaults for a given radius.
    pub fn with_radius(radius: f64) -> Self {
        Self {
            radius,
            max_correspondences: DEFAULT_MAX_CORRESPONDENCES,
            fallback_to_nearest: false,
        }
    }
}

/// Outcome of a face correspondence build.
#[derive(Debug, Clone)]
pub struct FaceMatchSummary {
    /// Radius used for the range queries.
    pub threshold: f64,
    /// Number of target faces queried.
    pub total: usize,
    /// Target faces with at least one match.
    pub matched: usize,
    /// Target faces matched only through the nearest fallback.
    pub fallback: usize,
    /// Target faces left without any match.
    pub unmatched: Vec<FaceId>,
}

impl FaceMatchSummary {
    /// Percentage of target faces left unmatched.
    pub fn unmatched_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.unmatched.len() as f64 / self.total as f64
        }
    }
}

enum FaceMatch {
    Range(Vec<usize>),
    Fallback(usize),
    None,
}

/// Target face → source faces whose centroids lie within the radius.
///
/// `source_faces` must index source face centroids with face normals.
/// Matches are sorted by ascending squared distance (ties by index) and
/// truncated to `max_correspondences`. Unmatched faces are reported in the
/// summary, never treated as an error.
pub fn build_face_correspondence(
    target: &TriangleMesh,
    source_faces: &SpatialIndex,
    options: &FaceMatchOptions,
) -> DeformResult<(Correspondence, FaceMatchSummary)> {
    let face_count = target.triangle_count();

    let matches: Vec<FaceMatch> = (0..face_count)
        .into_par_iter()
        .map(|f| {
            let normal = face_normal(target, f);
            if normal == DVec3::ZERO {
                warn!(face = f, "Invalid normal, target face left unmatched");
                return FaceMatch::None;
            }
            let centroid = face_centroid(target, f);

            let mut hits = source_faces.range(centroid, Some(normal), options.radius);
            if !hits.is_empty() {
                hits.sort_by(|a, b| {
                    a.distance_sq
                        .total_cmp(&b.distance_sq)
                        .then(a.index.cmp(&b.index))
                });
                if options.max_correspondences > 0 {
                    hits.truncate(options.max_correspondences);
                }
                return FaceMatch::Range(hits.into_iter().map(|h| h.index).collect());
            }

            if options.fallback_to_nearest {
                if let Some(hit) = source_faces.nearest(centroid, Some(normal)) {
                    return FaceMatch::Fallback(hit.index);
                }
            }
            FaceMatch::None
        })
        .collect();

    let mut corr = Correspondence::dense_multi(face_count);
    let mut summary = FaceMatchSummary {
        threshold: options.radius,
        total: face_count,
        matched: 0,
        fallback: 0,
        unmatched: Vec::new(),
    };

    for (f, m) in matches.into_iter().enumerate() {
        match m {
            FaceMatch::Range(sources) => {
                for s in sources {
                    corr.add(f, s)?;
                }
                summary.matched += 1;
            }
            FaceMatch::Fallback(s) => {
                corr.add(f, s)?;
                summary.matched += 1;
                summary.fallback += 1;
            }
            FaceMatch::None => summary.unmatched.push(FaceId::from(f)),
        }
    }

    info!(
        faces = face_count,
        threshold = options.radius,
        matched = summary.matched,
        pairs = corr.num_pairs(),
        "Constructed face correspondences"
    );
    if summary.fallback > 0 {
        info!(faces = summary.fallback, "Matched through nearest fallback");
    }
    if !summary.unmatched.is_empty() {
        warn!(
            "Missing correspondence: {} / {} ({:.2}%)",
            summary.unmatched.len(),
            face_count,
            summary.unmatched_percent()
        );
    }

    Ok((corr, summary))
}
