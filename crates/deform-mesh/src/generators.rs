//! Procedural mesh generators for testing.
//!
//! These generators produce deterministic, resolution-configurable meshes
//! with correct winding order and UV coordinates.

use deform_math::{DVec2, DVec3};

use crate::mesh::TriangleMesh;

/// Generates a flat rectangular quad grid in the XY plane.
///
/// The grid spans `[-width/2, width/2]` in X and `[-height/2, height/2]` in Y,
/// centered at the origin at Z=0. Rows run top to bottom.
///
/// # Arguments
/// - `cols`: Number of quads along X (vertex count = cols + 1).
/// - `rows`: Number of quads along Y (vertex count = rows + 1).
/// - `width`: Total width.
/// - `height`: Total height.
///
/// # Example
/// ```
/// use deform_mesh::generators::quad_grid;
/// let mesh = quad_grid(2, 2, 1.0, 1.0);
/// assert_eq!(mesh.vertex_count(), 9);  // 3×3 vertices
/// assert_eq!(mesh.triangle_count(), 8); // 2×2 quads × 2 tris each
/// ```
pub fn quad_grid(cols: usize, rows: usize, width: f64, height: f64) -> TriangleMesh {
    let verts_x = cols + 1;
    let verts_y = rows + 1;

    let mut mesh = TriangleMesh::with_capacity(verts_x * verts_y, cols * rows * 2);

    let half_w = width / 2.0;
    let half_h = height / 2.0;

    for j in 0..verts_y {
        for i in 0..verts_x {
            let u = i as f64 / cols as f64;
            let v = j as f64 / rows as f64;

            mesh.push_vertex(
                DVec3::new(-half_w + u * width, half_h - v * height, 0.0),
                DVec3::Z,
                Some(DVec2::new(u, v)),
            );
        }
    }

    // Two triangles per quad, both facing +Z
    for j in 0..rows {
        for i in 0..cols {
            let top_left = (j * verts_x + i) as u32;
            let top_right = top_left + 1;
            let bot_left = top_left + verts_x as u32;
            let bot_right = bot_left + 1;

            mesh.push_triangle(top_left, bot_left, top_right);
            mesh.push_triangle(top_right, bot_left, bot_right);
        }
    }

    mesh
}

/// Two triangles sharing the edge `(1, 2)`: a unit square split along
/// its anti-diagonal, facing +Z.
///
/// ```text
///  2 ---- 3
///  | \    |
///  |   \  |
///  0 ---- 1
/// ```
pub fn two_triangles() -> TriangleMesh {
    let mut mesh = TriangleMesh::with_capacity(4, 2);
    for (p, uv) in [
        (DVec3::new(0.0, 0.0, 0.0), DVec2::new(0.0, 0.0)),
        (DVec3::new(1.0, 0.0, 0.0), DVec2::new(1.0, 0.0)),
        (DVec3::new(0.0, 1.0, 0.0), DVec2::new(0.0, 1.0)),
        (DVec3::new(1.0, 1.0, 0.0), DVec2::new(1.0, 1.0)),
    ] {
        mesh.push_vertex(p, DVec3::Z, Some(uv));
    }
    mesh.push_triangle(0, 1, 2);
    mesh.push_triangle(2, 1, 3);
    mesh
}

/// Generates a UV sphere centered at the origin.
///
/// The seam column and the pole rings are duplicated vertices at
/// identical positions, as exported by most DCC tools.
///
/// # Arguments
/// - `radius`: Sphere radius.
/// - `stacks`: Number of horizontal slices (latitude divisions).
/// - `slices`: Number of vertical slices (longitude divisions).
pub fn uv_sphere(radius: f64, stacks: usize, slices: usize) -> TriangleMesh {
    let mut mesh = TriangleMesh::with_capacity((stacks + 1) * (slices + 1), stacks * slices * 2);

    for i in 0..=stacks {
        let phi = std::f64::consts::PI * i as f64 / stacks as f64; // 0 to PI
        // Exact at the south pole so the ring collapses onto one point
        let (sin_phi, cos_phi) = if i == stacks { (0.0, -1.0) } else { phi.sin_cos() };

        for j in 0..=slices {
            // The seam column repeats the j = 0 positions exactly
            let theta = 2.0 * std::f64::consts::PI * (j % slices) as f64 / slices as f64;
            let (sin_theta, cos_theta) = theta.sin_cos();

            let dir = DVec3::new(sin_phi * cos_theta, cos_phi, sin_phi * sin_theta);
            mesh.push_vertex(
                dir * radius,
                dir,
                Some(DVec2::new(j as f64 / slices as f64, i as f64 / stacks as f64)),
            );
        }
    }

    for i in 0..stacks {
        for j in 0..slices {
            let a = (i * (slices + 1) + j) as u32;
            let b = a + (slices + 1) as u32;

            // Wound outward; skip degenerate triangles at poles
            if i != 0 {
                mesh.push_triangle(a, a + 1, b);
            }
            if i != stacks - 1 {
                mesh.push_triangle(a + 1, b + 1, b);
            }
        }
    }

    mesh
}
