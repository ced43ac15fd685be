//! Correspondence resolver.
//!
//! Deforms a copy of the source reference toward the target reference
//! through a schedule of least-squares stages, then matches every target
//! face to the nearby source faces of the deformed copy.
//!
//! Each stage solves for the free source vertices plus one phantom vertex
//! per source face, minimizing:
//! 1. **Smoothness**: `w · (E_a x − E_b x)` for every ordered pair of
//!    adjacent faces
//! 2. **Identity**: `w · (E_f x − I)` for every face
//! 3. **Closest**: `w · (x_v − p_nearest)` for every free vertex, only
//!    when the stage weight is positive
//!
//! Anchored vertices never become unknowns; their positions are moved into
//! the constant term.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use deform_correspondence::build::{
    build_face_adjacency, build_face_correspondence, build_nearest_vertex, pair_threshold,
};
use deform_correspondence::{ConstraintMap, Correspondence, FaceMatchOptions, FaceMatchSummary};
use deform_math::faer_solver::FaerSolver;
use deform_math::geometry::{
    gradient_transfer_operator, inverse_surface_matrix, GradientOperator, IDENTITY_GRADIENT,
};
use deform_mesh::normals::compute_vertex_normals;
use deform_mesh::TriangleMesh;
use deform_search::SpatialIndex;
use deform_types::{DeformError, DeformResult, VertexId};

use crate::assembly::{point_at, Corner, LinearSystem};
use crate::config::{ResolverConfig, StageWeights};

/// Outcome of one resolver stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Zero-based stage index.
    pub stage: usize,
    pub weights: StageWeights,
    /// Rows of `A`.
    pub rows: usize,
    /// Columns of `A` (3 per free vertex and per phantom).
    pub cols: usize,
    /// Free vertices pulled toward a nearest target vertex.
    pub closest_pairs: usize,
    /// Largest vertex displacement applied by the stage.
    pub max_displacement: f64,
    pub wall_time: Duration,
}

/// Outcome of a full resolve.
#[derive(Debug, Clone)]
pub struct ResolveReport {
    pub stages: Vec<StageReport>,
    /// Face matching statistics, including the unmatched target faces.
    pub summary: FaceMatchSummary,
    pub wall_time: Duration,
}

/// Computes the target-face → source-faces correspondence from a sparse
/// set of anchored source vertices.
pub struct CorrespondenceResolver {
    /// Source reference as configured (normals recomputed if requested).
    reference: TriangleMesh,
    /// Copy deformed by the stages.
    working: TriangleMesh,
    target: TriangleMesh,
    constraints: ConstraintMap,
    config: ResolverConfig,
    /// Source face → edge-adjacent source faces.
    adjacency: Correspondence,
    /// Target vertices, filtered by vertex normal.
    target_vertices: SpatialIndex,
    /// Column block of each source vertex, `None` for anchored vertices
    /// and vertices referenced by no face.
    free_blocks: Vec<Option<usize>>,
    free_count: usize,
    solver: FaerSolver,
    face_correspondence: Option<Correspondence>,
}

impl CorrespondenceResolver {
    /// Prepares a resolve. Both meshes are copied; the caller's meshes are
    /// never modified.
    pub fn configure(
        source: &TriangleMesh,
        target: &TriangleMesh,
        constraints: ConstraintMap,
        config: ResolverConfig,
    ) -> DeformResult<Self> {
        config.validate()?;
        source.validate()?;
        target.validate()?;
        constraints.validate(source.vertex_count())?;

        let mut reference = source.clone();
        let mut target = target.clone();
        if config.recompute_normals {
            compute_vertex_normals(&mut reference);
            compute_vertex_normals(&mut target);
        }

        info!(
            vertices = reference.vertex_count(),
            triangles = reference.triangle_count(),
            "Source reference"
        );
        info!(
            vertices = target.vertex_count(),
            triangles = target.triangle_count(),
            "Target reference"
        );

        let adjacency = build_face_adjacency(&reference)?;
        let target_vertices = SpatialIndex::from_mesh_vertices(&target, true)?;

        let n = reference.vertex_count();
        let mut referenced = vec![false; n];
        for &v in &reference.indices {
            referenced[v as usize] = true;
        }

        let mut free_blocks = vec![None; n];
        let mut free_count = 0;
        for (v, block) in free_blocks.iter_mut().enumerate() {
            if referenced[v] && !constraints.contains(VertexId::from(v)) {
                *block = Some(free_count);
                free_count += 1;
            }
        }

        info!(
            constrained = constraints.len(),
            free = free_count,
            stages = config.stages.len(),
            "Vertex constraints"
        );

        Ok(Self {
            working: reference.clone(),
            reference,
            target,
            constraints,
            config,
            adjacency,
            target_vertices,
            free_blocks,
            free_count,
            solver: FaerSolver::new(),
            face_correspondence: None,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn constraints(&self) -> &ConstraintMap {
        &self.constraints
    }

    /// Number of free (unknown) source vertices per stage.
    pub fn free_vertex_count(&self) -> usize {
        self.free_count
    }

    /// The working copy: the source reference before a resolve, the
    /// deformed source after one.
    pub fn deformed_source(&self) -> &TriangleMesh {
        &self.working
    }

    /// Target face → source faces, available after [`resolve`](Self::resolve).
    pub fn face_correspondence(&self) -> Option<&Correspondence> {
        self.face_correspondence.as_ref()
    }

    pub fn into_face_correspondence(self) -> Option<Correspondence> {
        self.face_correspondence
    }

    /// Runs every stage and builds the face correspondence.
    pub fn resolve(&mut self) -> DeformResult<ResolveReport> {
        self.resolve_with_observer(|_, _| Ok(()))
    }

    /// Like [`resolve`](Self::resolve), calling `observer(stage, mesh)`
    /// with the deformed source after every stage. An observer error
    /// aborts the resolve.
    pub fn resolve_with_observer<F>(&mut self, mut observer: F) -> DeformResult<ResolveReport>
    where
        F: FnMut(usize, &TriangleMesh) -> DeformResult<()>,
    {
        let start = Instant::now();
        self.working = self.reference.clone();
        self.face_correspondence = None;

        let mut stages = Vec::with_capacity(self.config.stages.len());
        for stage in 0..self.config.stages.len() {
            let weights = self.config.stages[stage];
            let report = self.run_stage(stage, weights)?;
            observer(stage, &self.working)?;
            stages.push(report);
        }
        if stages.is_empty() {
            info!("Empty weight schedule, solving skipped");
        }

        let (corr, summary) = self.construct_correspondence()?;
        self.face_correspondence = Some(corr);

        let wall_time = start.elapsed();
        info!(elapsed_ms = wall_time.as_millis() as u64, "Resolve complete");

        Ok(ResolveReport {
            stages,
            summary,
            wall_time,
        })
    }

    fn run_stage(&mut self, stage: usize, weights: StageWeights) -> DeformResult<StageReport> {
        let start = Instant::now();
        info!(
            stage,
            smoothness = weights.smoothness,
            identity = weights.identity,
            closest = weights.closest,
            "Resolve stage"
        );

        let faces = self.working.triangle_count();
        let operators = self.face_operators()?;
        let corners: Vec<[Corner; 4]> = (0..faces).map(|f| self.corners(f)).collect();

        let nearest = if weights.closest > 0.0 {
            Some(build_nearest_vertex(&self.working, &self.target_vertices)?)
        } else {
            None
        };

        let mut rows = 9 * (self.adjacency.num_pairs() + faces);
        if nearest.is_some() {
            rows += 3 * self.free_count;
        }
        let mut system = LinearSystem::with_capacity(self.free_count + faces, rows);

        for f in 0..faces {
            for &g in self.adjacency.get(f) {
                let row = system.push_rows(9);
                system.add_operator(row, &operators[f], &corners[f], weights.smoothness);
                system.add_operator(row, &operators[g], &corners[g], -weights.smoothness);
            }
        }

        for f in 0..faces {
            let row = system.push_rows(9);
            system.add_operator(row, &operators[f], &corners[f], weights.identity);
            system.add_constants(row, &IDENTITY_GRADIENT, weights.identity);
        }

        let mut closest_pairs = 0;
        if let Some(nearest) = &nearest {
            for (v, block) in self.free_blocks.iter().enumerate() {
                let Some(block) = *block else { continue };
                let Some(&t) = nearest.get(v).first() else {
                    continue;
                };
                system.push_point(block, self.target.position(t), weights.closest);
                closest_pairs += 1;
            }
        }

        info!(
            rows = system.rows(),
            cols = system.cols(),
            entries = system.triplet_count(),
            "Problem size"
        );

        let x = system.solve_least_squares(&mut self.solver)?;
        let max_displacement = self.copy_solution(&x);

        if self.config.recompute_normals {
            compute_vertex_normals(&mut self.working);
        }

        let wall_time = start.elapsed();
        info!(
            stage,
            max_displacement,
            elapsed_ms = wall_time.as_millis() as u64,
            "Stage solved"
        );

        Ok(StageReport {
            stage,
            weights,
            rows: system.rows(),
            cols: system.cols(),
            closest_pairs,
            max_displacement,
            wall_time,
        })
    }

    /// Gradient operator of every face of the working mesh.
    fn face_operators(&self) -> DeformResult<Vec<GradientOperator>> {
        (0..self.working.triangle_count())
            .map(|f| {
                let [v0, v1, v2] = self.working.triangle_positions(f);
                inverse_surface_matrix(v0, v1, v2)
                    .map(|inv| gradient_transfer_operator(&inv))
                    .ok_or(DeformError::DegenerateFace { face: f })
            })
            .collect()
    }

    /// Three real corners of face `f` followed by its phantom.
    fn corners(&self, f: usize) -> [Corner; 4] {
        let [a, b, c] = self.working.triangle(f);
        let corner = |v: u32| {
            let v = v as usize;
            match self.free_blocks[v] {
                Some(block) => Corner::Free(block),
                None => Corner::Fixed(
                    self.constraints
                        .get(VertexId::from(v))
                        .unwrap_or_else(|| self.working.position(v)),
                ),
            }
        };
        [
            corner(a),
            corner(b),
            corner(c),
            Corner::Free(self.free_count + f),
        ]
    }

    /// Writes free vertices from `x` and anchored vertices from the
    /// constraint map. Returns the largest displacement.
    fn copy_solution(&mut self, x: &[f64]) -> f64 {
        let mut max_displacement = 0.0f64;
        let mut logged = 0;
        for v in 0..self.working.vertex_count() {
            let next = match self.free_blocks[v] {
                Some(block) => point_at(x, block),
                None => match self.constraints.get(VertexId::from(v)) {
                    Some(p) => p,
                    None => continue,
                },
            };
            let previous = self.working.position(v);
            max_displacement = max_displacement.max(previous.distance(next));
            if logged < 3 {
                debug!(vertex = v, ?previous, ?next, "Vertex moved");
                logged += 1;
            }
            self.working.set_position(v, next);
        }
        max_displacement
    }

    fn construct_correspondence(&self) -> DeformResult<(Correspondence, FaceMatchSummary)> {
        let threshold = pair_threshold(&self.working, &self.target);
        info!(
            faces = self.working.triangle_count(),
            threshold, "Constructing face correspondences"
        );

        let source_faces = SpatialIndex::from_mesh_faces(&self.working, true)?;
        let options = FaceMatchOptions {
            radius: threshold,
            max_correspondences: self.config.max_correspondences,
            fallback_to_nearest: self.config.fallback_to_nearest,
        };
        build_face_correspondence(&self.target, &source_faces, &options)
    }
}
