//! Core triangle mesh type with SoA (Structure of Arrays) layout.
//!
//! The SoA layout stores each coordinate channel contiguously:
//! - `pos_x: [x0, x1, x2, ...]`
//! - `pos_y: [y0, y1, y2, ...]`
//! - `pos_z: [z0, z1, z2, ...]`
//!
//! Positions are double precision: the least-squares systems built from
//! them are ill-conditioned enough that f32 inputs visibly perturb results.

use serde::{Deserialize, Serialize};

use deform_math::{DVec2, DVec3};
use deform_types::{DeformError, DeformResult};

/// A triangle mesh stored in Structure-of-Arrays layout.
///
/// UV channels are either empty (mesh has no texture coordinates) or
/// exactly one entry per vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    // --- Vertex data (SoA) ---
    /// X coordinates of all vertices.
    pub pos_x: Vec<f64>,
    /// Y coordinates of all vertices.
    pub pos_y: Vec<f64>,
    /// Z coordinates of all vertices.
    pub pos_z: Vec<f64>,

    /// X components of vertex normals.
    pub normal_x: Vec<f64>,
    /// Y components of vertex normals.
    pub normal_y: Vec<f64>,
    /// Z components of vertex normals.
    pub normal_z: Vec<f64>,

    /// U texture coordinates (empty when the mesh has none).
    #[serde(default)]
    pub uv_u: Vec<f64>,
    /// V texture coordinates (empty when the mesh has none).
    #[serde(default)]
    pub uv_v: Vec<f64>,

    // --- Triangle data ---
    /// Triangle indices, each triangle is [v0, v1, v2].
    /// Stored flat: `[t0v0, t0v1, t0v2, t1v0, t1v1, t1v2, ...]`
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.pos_x.len()
    }

    /// Returns the number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns true if the mesh carries texture coordinates.
    #[inline]
    pub fn has_uvs(&self) -> bool {
        !self.uv_u.is_empty()
    }

    /// Returns the position of vertex `i`.
    #[inline]
    pub fn position(&self, i: usize) -> DVec3 {
        DVec3::new(self.pos_x[i], self.pos_y[i], self.pos_z[i])
    }

    /// Returns the normal of vertex `i`.
    #[inline]
    pub fn normal(&self, i: usize) -> DVec3 {
        DVec3::new(self.normal_x[i], self.normal_y[i], self.normal_z[i])
    }

    /// Returns the texture coordinate of vertex `i`, if the mesh has UVs.
    #[inline]
    pub fn uv(&self, i: usize) -> Option<DVec2> {
        self.has_uvs().then(|| DVec2::new(self.uv_u[i], self.uv_v[i]))
    }

    /// Returns the three vertex indices of triangle `t`.
    #[inline]
    pub fn triangle(&self, t: usize) -> [u32; 3] {
        let base = t * 3;
        [self.indices[base], self.indices[base + 1], self.indices[base + 2]]
    }

    /// Returns the three corner positions of triangle `t`.
    #[inline]
    pub fn triangle_positions(&self, t: usize) -> [DVec3; 3] {
        let [a, b, c] = self.triangle(t);
        [
            self.position(a as usize),
            self.position(b as usize),
            self.position(c as usize),
        ]
    }

    /// Collects all positions into a vector.
    pub fn positions(&self) -> Vec<DVec3> {
        (0..self.vertex_count()).map(|i| self.position(i)).collect()
    }

    /// Collects all vertex normals into a vector.
    pub fn normals(&self) -> Vec<DVec3> {
        (0..self.vertex_count()).map(|i| self.normal(i)).collect()
    }

    /// Sets the position of vertex `i`.
    #[inline]
    pub fn set_position(&mut self, i: usize, p: DVec3) {
        self.pos_x[i] = p.x;
        self.pos_y[i] = p.y;
        self.pos_z[i] = p.z;
    }

    /// Sets the normal of vertex `i`.
    #[inline]
    pub fn set_normal(&mut self, i: usize, n: DVec3) {
        self.normal_x[i] = n.x;
        self.normal_y[i] = n.y;
        self.normal_z[i] = n.z;
    }

    /// Axis-aligned bounding box as `(min, max)`.
    ///
    /// An empty mesh returns `(ZERO, ZERO)`.
    pub fn bounds(&self) -> (DVec3, DVec3) {
        if self.vertex_count() == 0 {
            return (DVec3::ZERO, DVec3::ZERO);
        }
        (0..self.vertex_count()).fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(lo, hi), i| {
                let p = self.position(i);
                (lo.min(p), hi.max(p))
            },
        )
    }

    /// Length of the bounding box diagonal.
    pub fn diagonal(&self) -> f64 {
        let (lo, hi) = self.bounds();
        (hi - lo).length()
    }

    /// Creates an empty mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_capacity: usize, triangle_capacity: usize) -> Self {
        Self {
            pos_x: Vec::with_capacity(vertex_capacity),
            pos_y: Vec::with_capacity(vertex_capacity),
            pos_z: Vec::with_capacity(vertex_capacity),
            normal_x: Vec::with_capacity(vertex_capacity),
            normal_y: Vec::with_capacity(vertex_capacity),
            normal_z: Vec::with_capacity(vertex_capacity),
            uv_u: Vec::with_capacity(vertex_capacity),
            uv_v: Vec::with_capacity(vertex_capacity),
            indices: Vec::with_capacity(triangle_capacity * 3),
        }
    }

    /// Appends a vertex. UVs are only pushed when `uv` is `Some`; mixing
    /// vertices with and without UVs is rejected by [`validate`](Self::validate).
    pub fn push_vertex(&mut self, position: DVec3, normal: DVec3, uv: Option<DVec2>) {
        self.pos_x.push(position.x);
        self.pos_y.push(position.y);
        self.pos_z.push(position.z);
        self.normal_x.push(normal.x);
        self.normal_y.push(normal.y);
        self.normal_z.push(normal.z);
        if let Some(uv) = uv {
            self.uv_u.push(uv.x);
            self.uv_v.push(uv.y);
        }
    }

    /// Appends a triangle.
    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Validates mesh integrity.
    ///
    /// Checks:
    /// - All SoA arrays have the same length (UVs may be empty)
    /// - Triangle indices are within bounds
    /// - No degenerate triangles (repeated vertex indices)
    /// - Positions are finite
    pub fn validate(&self) -> DeformResult<()> {
        let n = self.pos_x.len();

        if self.pos_y.len() != n || self.pos_z.len() != n {
            return Err(DeformError::InvalidMesh(
                "Position arrays have inconsistent lengths".into(),
            ));
        }
        if self.normal_x.len() != n || self.normal_y.len() != n || self.normal_z.len() != n {
            return Err(DeformError::InvalidMesh(
                "Normal arrays have inconsistent lengths".into(),
            ));
        }
        if self.uv_u.len() != self.uv_v.len() || (!self.uv_u.is_empty() && self.uv_u.len() != n)
        {
            return Err(DeformError::InvalidMesh(format!(
                "UV arrays have inconsistent lengths ({} / {} for {} vertices)",
                self.uv_u.len(),
                self.uv_v.len(),
                n
            )));
        }

        if self.indices.len() % 3 != 0 {
            return Err(DeformError::InvalidMesh(
                "Index count is not divisible by 3".into(),
            ));
        }

        for (i, &idx) in self.indices.iter().enumerate() {
            if idx as usize >= n {
                return Err(DeformError::InvalidMesh(format!(
                    "Index {} at position {} is out of range (vertex count: {})",
                    idx, i, n
                )));
            }
        }

        for t in 0..self.triangle_count() {
            let [a, b, c] = self.triangle(t);
            if a == b || b == c || a == c {
                return Err(DeformError::InvalidMesh(format!(
                    "Triangle {} has repeated vertex indices: [{}, {}, {}]",
                    t, a, b, c
                )));
            }
        }

        if let Some(i) = (0..n).find(|&i| !self.position(i).is_finite()) {
            return Err(DeformError::InvalidMesh(format!(
                "Vertex {} has a non-finite position",
                i
            )));
        }

        Ok(())
    }

    /// Constructs a mesh from interleaved AoS data.
    ///
    /// Converts `[x0, y0, z0, x1, y1, z1, ...]` to SoA layout. `uvs` is
    /// either empty or `[u0, v0, u1, v1, ...]` with one pair per vertex.
    /// Normals start at zero; call
    /// [`compute_vertex_normals`](crate::normals::compute_vertex_normals).
    pub fn from_interleaved(positions: &[f64], indices: &[u32], uvs: &[f64]) -> DeformResult<Self> {
        if positions.len() % 3 != 0 {
            return Err(DeformError::InvalidMesh(
                "Interleaved positions length not divisible by 3".into(),
            ));
        }

        let n = positions.len() / 3;
        if !uvs.is_empty() && uvs.len() != n * 2 {
            return Err(DeformError::SizeMismatch {
                what: "interleaved uvs",
                expected: n * 2,
                actual: uvs.len(),
            });
        }

        let mut mesh = Self::with_capacity(n, indices.len() / 3);
        for p in positions.chunks_exact(3) {
            mesh.pos_x.push(p[0]);
            mesh.pos_y.push(p[1]);
            mesh.pos_z.push(p[2]);
        }
        for uv in uvs.chunks_exact(2) {
            mesh.uv_u.push(uv[0]);
            mesh.uv_v.push(uv[1]);
        }

        mesh.normal_x.resize(n, 0.0);
        mesh.normal_y.resize(n, 0.0);
        mesh.normal_z.resize(n, 0.0);

        mesh.indices = indices.to_vec();

        mesh.validate()?;
        Ok(mesh)
    }
}
