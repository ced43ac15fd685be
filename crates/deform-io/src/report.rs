//! Mesh diagnostics.
//!
//! Summarizes a mesh before it reaches a solver, so structural problems
//! (open boundaries where none are expected, zero-area faces that would
//! make a surface matrix singular) show up with clear numbers.

use std::fmt;

use serde::Serialize;

use deform_mesh::normals::face_area;
use deform_mesh::{Topology, TriangleMesh};

/// Structural summary of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshReport {
    pub vertices: usize,
    pub triangles: usize,
    pub has_uvs: bool,
    pub boundary_edges: usize,
    pub non_manifold_edges: usize,
    /// Vertices referenced by no triangle.
    pub isolated_vertices: usize,
    /// Triangles whose area is at most `area_epsilon`.
    pub degenerate_faces: Vec<usize>,
    pub bounds_min: [f64; 3],
    pub bounds_max: [f64; 3],
}

impl MeshReport {
    /// Builds the report. Faces with area `<= area_epsilon` are counted as
    /// degenerate.
    pub fn new(mesh: &TriangleMesh, area_epsilon: f64) -> Self {
        let topology = Topology::build(mesh);
        let degenerate_faces = (0..mesh.triangle_count())
            .filter(|&t| face_area(mesh, t) <= area_epsilon)
            .collect();
        let (min, max) = mesh.bounds();

        Self {
            vertices: mesh.vertex_count(),
            triangles: mesh.triangle_count(),
            has_uvs: mesh.has_uvs(),
            boundary_edges: topology.boundary_edge_count(),
            non_manifold_edges: topology.non_manifold_edge_count(),
            isolated_vertices: topology.isolated_vertices().len(),
            degenerate_faces,
            bounds_min: min.to_array(),
            bounds_max: max.to_array(),
        }
    }

    /// True when both solvers can use the mesh: no degenerate faces.
    pub fn is_solvable(&self) -> bool {
        self.degenerate_faces.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.boundary_edges == 0
    }
}

impl fmt::Display for MeshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vertices:           {}", self.vertices)?;
        writeln!(f, "triangles:          {}", self.triangles)?;
        writeln!(f, "uvs:                {}", if self.has_uvs { "yes" } else { "no" })?;
        writeln!(f, "boundary edges:     {}", self.boundary_edges)?;
        writeln!(f, "non-manifold edges: {}", self.non_manifold_edges)?;
        writeln!(f, "isolated vertices:  {}", self.isolated_vertices)?;
        writeln!(f, "degenerate faces:   {}", self.degenerate_faces.len())?;
        write!(
            f,
            "bounds:             [{:.4}, {:.4}, {:.4}] .. [{:.4}, {:.4}, {:.4}]",
            self.bounds_min[0],
            self.bounds_min[1],
            self.bounds_min[2],
            self.bounds_max[0],
            self.bounds_max[1],
            self.bounds_max[2]
        )
    }
}
