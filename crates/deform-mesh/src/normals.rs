//! Normal and centroid computation from triangle mesh data.
//!
//! Vertex normals are area-weighted: each triangle's cross product
//! (magnitude = 2 × area) is accumulated at its corners and normalized.

use deform_math::DVec3;

use crate::mesh::TriangleMesh;

/// Unnormalized face normal `(p1 − p0) × (p2 − p0)`.
#[inline]
fn face_cross(mesh: &TriangleMesh, t: usize) -> DVec3 {
    let [p0, p1, p2] = mesh.triangle_positions(t);
    (p1 - p0).cross(p2 - p0)
}

/// Unit normal of triangle `t`, or zero for a degenerate triangle.
pub fn face_normal(mesh: &TriangleMesh, t: usize) -> DVec3 {
    face_cross(mesh, t).normalize_or_zero()
}

/// Centroid of triangle `t`.
pub fn face_centroid(mesh: &TriangleMesh, t: usize) -> DVec3 {
    let [p0, p1, p2] = mesh.triangle_positions(t);
    (p0 + p1 + p2) / 3.0
}

/// Area of triangle `t`.
pub fn face_area(mesh: &TriangleMesh, t: usize) -> f64 {
    0.5 * face_cross(mesh, t).length()
}

/// Unit normals of all triangles.
pub fn face_normals(mesh: &TriangleMesh) -> Vec<DVec3> {
    (0..mesh.triangle_count()).map(|t| face_normal(mesh, t)).collect()
}

/// Centroids of all triangles.
pub fn face_centroids(mesh: &TriangleMesh) -> Vec<DVec3> {
    (0..mesh.triangle_count()).map(|t| face_centroid(mesh, t)).collect()
}

/// Recompute vertex normals from triangle geometry (area-weighted).
///
/// Vertices touched by no triangle (or only by degenerate ones) keep a
/// zero normal.
///
/// This modifies the mesh's `normal_x`, `normal_y`, `normal_z` arrays in place.
pub fn compute_vertex_normals(mesh: &mut TriangleMesh) {
    let n = mesh.vertex_count();
    let mut accum = vec![DVec3::ZERO; n];

    for t in 0..mesh.triangle_count() {
        let cross = face_cross(mesh, t);
        for v in mesh.triangle(t) {
            accum[v as usize] += cross;
        }
    }

    mesh.normal_x.resize(n, 0.0);
    mesh.normal_y.resize(n, 0.0);
    mesh.normal_z.resize(n, 0.0);
    for (i, sum) in accum.into_iter().enumerate() {
        mesh.set_normal(i, sum.normalize_or_zero());
    }
}
