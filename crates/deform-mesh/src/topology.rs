//! Mesh topology queries.
//!
//! Builds adjacency data structures from the triangle index buffer.
//! Every list is produced in a stable order (triangle index, then edge
//! `(a,b), (b,c), (c,a)` within the triangle), so systems assembled from
//! it are reproducible run to run.

use std::collections::HashMap;

use crate::mesh::TriangleMesh;

/// Precomputed topology information for a triangle mesh.
#[derive(Debug, Clone)]
pub struct Topology {
    /// For each vertex, the list of triangles that contain it.
    pub vertex_triangles: Vec<Vec<u32>>,

    /// Unique edges as `[v_min, v_max]`, in order of first appearance.
    pub edges: Vec<[u32; 2]>,

    /// For each edge, the adjacent triangles (1 on a boundary, 2 inside,
    /// more on non-manifold edges).
    pub edge_triangles: Vec<Vec<u32>>,

    /// For each triangle, the triangles sharing one of its edges.
    /// No duplicates, never the triangle itself.
    pub face_neighbors: Vec<Vec<u32>>,
}

impl Topology {
    /// Build topology from a triangle mesh.
    pub fn build(mesh: &TriangleMesh) -> Self {
        let vertex_count = mesh.vertex_count();
        let tri_count = mesh.triangle_count();

        let mut vertex_triangles: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
        for t in 0..tri_count {
            for v in mesh.triangle(t) {
                vertex_triangles[v as usize].push(t as u32);
            }
        }

        // Key: (min_vertex, max_vertex) to canonicalize edge direction
        let mut edge_lookup: HashMap<(u32, u32), usize> = HashMap::new();
        let mut edges: Vec<[u32; 2]> = Vec::new();
        let mut edge_triangles: Vec<Vec<u32>> = Vec::new();
        let mut triangle_edges: Vec<[usize; 3]> = Vec::with_capacity(tri_count);

        for t in 0..tri_count {
            let [a, b, c] = mesh.triangle(t);
            let mut local = [0usize; 3];
            for (slot, (v0, v1)) in [(a, b), (b, c), (c, a)].into_iter().enumerate() {
                let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
                let edge = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push([key.0, key.1]);
                    edge_triangles.push(Vec::new());
                    edges.len() - 1
                });
                edge_triangles[edge].push(t as u32);
                local[slot] = edge;
            }
            triangle_edges.push(local);
        }

        let face_neighbors = triangle_edges
            .iter()
            .enumerate()
            .map(|(t, local)| {
                let mut neighbors: Vec<u32> = Vec::new();
                for &edge in local {
                    for &other in &edge_triangles[edge] {
                        if other as usize != t && !neighbors.contains(&other) {
                            neighbors.push(other);
                        }
                    }
                }
                neighbors
            })
            .collect();

        Self {
            vertex_triangles,
            edges,
            edge_triangles,
            face_neighbors,
        }
    }

    /// Returns the number of boundary edges (edges with only 1 adjacent triangle).
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_triangles
            .iter()
            .filter(|tris| tris.len() == 1)
            .count()
    }

    /// Returns the number of edges shared by more than 2 triangles.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_triangles
            .iter()
            .filter(|tris| tris.len() > 2)
            .count()
    }

    /// Returns true if the mesh is closed (no boundary edges).
    pub fn is_closed(&self) -> bool {
        self.boundary_edge_count() == 0
    }

    /// Vertices not referenced by any triangle.
    pub fn isolated_vertices(&self) -> Vec<u32> {
        self.vertex_triangles
            .iter()
            .enumerate()
            .filter(|(_, tris)| tris.is_empty())
            .map(|(v, _)| v as u32)
            .collect()
    }
}
