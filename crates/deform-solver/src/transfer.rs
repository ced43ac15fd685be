//! Deformation transfer.
//!
//! Moves a target mesh so that each of its faces reproduces the
//! deformation gradients `Q = Vd · inv(Vr)` of its corresponding source
//! faces. A target face without correspondences is held to the identity.
//!
//! The system matrix depends only on the target reference and the
//! correspondence, so `AᵀA` is factorized once and every deformed pose
//! costs one assembly of `c` plus a back-substitution.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use deform_correspondence::{Correspondence, CorrespondenceKind};
use deform_math::faer_solver::FaerSolver;
use deform_math::geometry::{
    deformation_gradient, flatten_row_major, gradient_transfer_operator, inverse_surface_matrix,
    surface_matrix, IDENTITY_GRADIENT,
};
use deform_math::sparse::{CsrMatrix, SparseSolver};
use deform_math::{DMat3, DVec3};
use deform_mesh::normals::compute_vertex_normals;
use deform_mesh::TriangleMesh;
use deform_types::{DeformError, DeformResult};

use crate::assembly::{point_at, Corner, LinearSystem};
use crate::config::TransferConfig;

/// Wall time spent in each phase of a setup or deform call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferTimings {
    /// Building `A` (setup) or `c` and `Aᵀc` (deform).
    pub assemble: Duration,
    /// Factorizing `AᵀA` (setup only).
    pub factorize: Duration,
    /// Back-substitution (deform only).
    pub solve: Duration,
}

/// Cached target-side system.
struct TargetSystem {
    correspondence: Correspondence,
    /// `A`, kept for `Aᵀc`.
    matrix: CsrMatrix,
    vertex_count: usize,
    face_count: usize,
    /// Target vertex → column block.
    vertex_blocks: Vec<usize>,
    /// Reference position of each real column block.
    block_positions: Vec<DVec3>,
    /// Absolute Tikhonov weight on the real-vertex unknowns.
    lambda: f64,
}

/// Deformation transfer solver.
///
/// Set the source reference and a source pose (in either order), set the
/// target reference once, then call [`deform`](Self::deform) per pose.
pub struct TransferSolver {
    /// `inv(Vr)` per source face.
    inv_reference: Option<Vec<DMat3>>,
    /// `Vd` per source face.
    deformed: Option<Vec<DMat3>>,
    /// Row-major `Q` per source face, present once both sides are set.
    gradients: Vec<[f64; 9]>,
    target: Option<TargetSystem>,
    solver: FaerSolver,
}

impl TransferSolver {
    pub fn new() -> Self {
        Self {
            inv_reference: None,
            deformed: None,
            gradients: Vec::new(),
            target: None,
            solver: FaerSolver::new(),
        }
    }

    /// Caches `inv(Vr)` for every source face.
    pub fn set_source_reference(&mut self, mesh: &TriangleMesh) -> DeformResult<()> {
        let start = Instant::now();
        let inv = (0..mesh.triangle_count())
            .map(|f| {
                let [v0, v1, v2] = mesh.triangle_positions(f);
                inverse_surface_matrix(v0, v1, v2).ok_or(DeformError::DegenerateFace { face: f })
            })
            .collect::<DeformResult<Vec<_>>>()?;

        check_face_count(self.deformed.as_deref(), inv.len())?;
        self.inv_reference = Some(inv);

        info!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Source reference"
        );
        self.update_gradients();
        Ok(())
    }

    /// Uses the identity as `inv(Vr)` for every face of `mesh`.
    pub fn set_identity_source_reference(&mut self, mesh: &TriangleMesh) -> DeformResult<()> {
        check_face_count(self.deformed.as_deref(), mesh.triangle_count())?;
        self.inv_reference = Some(vec![DMat3::IDENTITY; mesh.triangle_count()]);
        info!(triangles = mesh.triangle_count(), "Source reference (identity)");
        self.update_gradients();
        Ok(())
    }

    /// Caches `Vd` for every face of a deformed source pose.
    pub fn set_source_deform(&mut self, mesh: &TriangleMesh) -> DeformResult<()> {
        let start = Instant::now();
        check_face_count(self.inv_reference.as_deref(), mesh.triangle_count())?;
        self.deformed = Some(
            (0..mesh.triangle_count())
                .map(|f| {
                    let [v0, v1, v2] = mesh.triangle_positions(f);
                    surface_matrix(v0, v1, v2)
                })
                .collect(),
        );

        info!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Source deform"
        );
        self.update_gradients();
        Ok(())
    }

    /// Uses the identity as `Vd` for every face of `mesh`.
    pub fn set_identity_source_deform(&mut self, mesh: &TriangleMesh) -> DeformResult<()> {
        check_face_count(self.inv_reference.as_deref(), mesh.triangle_count())?;
        self.deformed = Some(vec![DMat3::IDENTITY; mesh.triangle_count()]);
        info!(triangles = mesh.triangle_count(), "Source deform (identity)");
        self.update_gradients();
        Ok(())
    }

    fn update_gradients(&mut self) {
        self.gradients = match (&self.inv_reference, &self.deformed) {
            (Some(inv), Some(vd)) => inv
                .iter()
                .zip(vd)
                .map(|(inv, vd)| flatten_row_major(&deformation_gradient(inv, vd)))
                .collect(),
            _ => Vec::new(),
        };
    }

    /// Builds `A` for the target reference and factorizes `AᵀA`.
    ///
    /// `correspondence` maps target faces to source faces. Each target
    /// face contributes one 9-row block per corresponding source face, or
    /// a single identity block when it has none.
    pub fn set_target_reference(
        &mut self,
        mesh: &TriangleMesh,
        correspondence: Correspondence,
        config: &TransferConfig,
    ) -> DeformResult<TransferTimings> {
        config.validate()?;
        mesh.validate()?;

        self.target = None;
        self.solver.reset();

        let face_count = mesh.triangle_count();
        if correspondence.kind() != CorrespondenceKind::Sparse && correspondence.size() != face_count
        {
            return Err(DeformError::SizeMismatch {
                what: "face correspondence",
                expected: face_count,
                actual: correspondence.size(),
            });
        }
        if let Some((f, _)) = correspondence.entries().find(|&(f, _)| f >= face_count) {
            return Err(DeformError::InvalidCorrespondence(format!(
                "Target face {} out of range (face count: {})",
                f, face_count
            )));
        }

        info!(
            vertices = mesh.vertex_count(),
            triangles = face_count,
            "Target reference"
        );

        let start = Instant::now();
        let (vertex_blocks, block_positions) = if config.dedup_vertices {
            unique_vertex_blocks(mesh)
        } else {
            ((0..mesh.vertex_count()).collect(), mesh.positions())
        };
        let unique = block_positions.len();
        if unique < mesh.vertex_count() {
            info!(unique, "Collapsed duplicate vertices");
        } else if config.dedup_vertices {
            info!("No duplicate vertices");
        }

        let slots: usize = (0..face_count)
            .map(|f| correspondence.get(f).len().max(1))
            .sum();
        let mut system = LinearSystem::with_capacity(unique + face_count, slots * 9);

        for f in 0..face_count {
            let [v0, v1, v2] = mesh.triangle_positions(f);
            let inv = inverse_surface_matrix(v0, v1, v2)
                .ok_or(DeformError::DegenerateFace { face: f })?;
            let op = gradient_transfer_operator(&inv);

            let [a, b, c] = mesh.triangle(f);
            let corners = [
                Corner::Free(vertex_blocks[a as usize]),
                Corner::Free(vertex_blocks[b as usize]),
                Corner::Free(vertex_blocks[c as usize]),
                Corner::Free(unique + f),
            ];
            for _ in 0..correspondence.get(f).len().max(1) {
                let row = system.push_rows(9);
                system.add_operator(row, &op, &corners, 1.0);
            }
        }

        let matrix = system.matrix();
        info!(rows = matrix.rows, cols = matrix.cols, "Constructed A");

        let mut ata = matrix.normal_matrix();
        let lambda = if config.regularization > 0.0 && ata.rows > 0 {
            let diag = ata.diagonal();
            let mean = diag.iter().sum::<f64>() / diag.len() as f64;
            config.regularization * mean
        } else {
            0.0
        };
        if lambda > 0.0 {
            let mut d = vec![0.0; ata.rows];
            d[..unique * 3].fill(lambda);
            ata = ata.add_diagonal(&d);
        }
        let assemble = start.elapsed();

        let start = Instant::now();
        self.solver
            .factorize(&ata)
            .map_err(|e| DeformError::Solver(format!("Failed to factorize AᵀA: {e}")))?;
        let factorize = start.elapsed();

        info!(
            assemble_ms = assemble.as_millis() as u64,
            factorize_ms = factorize.as_millis() as u64,
            lambda,
            "Factorized transfer system"
        );

        self.target = Some(TargetSystem {
            correspondence,
            matrix,
            vertex_count: mesh.vertex_count(),
            face_count,
            vertex_blocks,
            block_positions,
            lambda,
        });

        Ok(TransferTimings {
            assemble,
            factorize,
            solve: Duration::ZERO,
        })
    }

    /// Returns true once a target reference has been factorized.
    pub fn is_ready(&self) -> bool {
        self.target.is_some() && self.solver.is_factorized()
    }

    /// Rows of `A` (9 per correspondence slot).
    pub fn rows(&self) -> usize {
        self.target.as_ref().map_or(0, |t| t.matrix.rows)
    }

    /// Number of distinct target vertex unknowns.
    pub fn unique_vertex_count(&self) -> usize {
        self.target.as_ref().map_or(0, |t| t.block_positions.len())
    }

    /// Solves for the target pose matching the current source pose and
    /// writes it into `mesh`, recomputing its vertex normals.
    ///
    /// `mesh` must have the vertex and face counts of the target reference.
    pub fn deform(&self, mesh: &mut TriangleMesh) -> DeformResult<TransferTimings> {
        let target = match &self.target {
            Some(t) if self.solver.is_factorized() => t,
            _ => {
                return Err(DeformError::Solver(
                    "No factorization available. Call set_target_reference() first.".into(),
                ))
            }
        };
        if self.inv_reference.is_none() || self.deformed.is_none() {
            return Err(DeformError::InvalidConfig(
                "Source reference and source deform must both be set".into(),
            ));
        }
        if mesh.triangle_count() != target.face_count {
            return Err(DeformError::SizeMismatch {
                what: "target face count",
                expected: target.face_count,
                actual: mesh.triangle_count(),
            });
        }
        if mesh.vertex_count() != target.vertex_count {
            return Err(DeformError::SizeMismatch {
                what: "target vertex count",
                expected: target.vertex_count,
                actual: mesh.vertex_count(),
            });
        }

        let start = Instant::now();
        let mut c = Vec::with_capacity(target.matrix.rows);
        for f in 0..target.face_count {
            let sources = target.correspondence.get(f);
            if sources.is_empty() {
                c.extend_from_slice(&IDENTITY_GRADIENT);
                continue;
            }
            for &s in sources {
                let q = self.gradients.get(s).ok_or_else(|| {
                    DeformError::InvalidCorrespondence(format!(
                        "Target face {} maps to source face {}, but the source has {} faces",
                        f,
                        s,
                        self.gradients.len()
                    ))
                })?;
                c.extend_from_slice(q);
            }
        }

        let mut rhs = target.matrix.transpose_mul_vec(&c);
        if target.lambda > 0.0 {
            for (block, p) in target.block_positions.iter().enumerate() {
                for axis in 0..3 {
                    rhs[block * 3 + axis] += target.lambda * p[axis];
                }
            }
        }
        let assemble = start.elapsed();

        let start = Instant::now();
        let mut x = vec![0.0; rhs.len()];
        self.solver
            .solve(&rhs, &mut x)
            .map_err(|e| DeformError::Solver(format!("Failed to solve transfer system: {e}")))?;
        let solve = start.elapsed();

        for (v, &block) in target.vertex_blocks.iter().enumerate() {
            let next = point_at(&x, block);
            if v < 3 {
                debug!(vertex = v, previous = ?mesh.position(v), ?next, "Vertex moved");
            }
            mesh.set_position(v, next);
        }
        compute_vertex_normals(mesh);

        info!(
            assemble_ms = assemble.as_millis() as u64,
            solve_ms = solve.as_millis() as u64,
            "Deformed target"
        );

        Ok(TransferTimings {
            assemble,
            factorize: Duration::ZERO,
            solve,
        })
    }
}

impl Default for TransferSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails when per-face data is already cached for a different face count.
fn check_face_count(cached: Option<&[DMat3]>, faces: usize) -> DeformResult<()> {
    match cached {
        Some(cached) if cached.len() != faces => Err(DeformError::SizeMismatch {
            what: "source face count",
            expected: cached.len(),
            actual: faces,
        }),
        _ => Ok(()),
    }
}

/// Maps every vertex to a column block shared by all vertices at exactly
/// the same position. Blocks are numbered in order of first appearance.
fn unique_vertex_blocks(mesh: &TriangleMesh) -> (Vec<usize>, Vec<DVec3>) {
    let n = mesh.vertex_count();
    let mut seen: HashMap<[u64; 3], usize> = HashMap::with_capacity(n);
    let mut blocks = Vec::with_capacity(n);
    let mut positions = Vec::new();

    for v in 0..n {
        let p = mesh.position(v);
        // +0.0 folds -0.0 into the same key
        let key = [p.x, p.y, p.z].map(|c| (c + 0.0).to_bits());
        let block = *seen.entry(key).or_insert_with(|| {
            positions.push(p);
            positions.len() - 1
        });
        blocks.push(block);
    }
    (blocks, positions)
}
