//! Per-triangle geometry for deformation gradients.
//!
//! A triangle `(v0, v1, v2)` is lifted to a tetrahedron by a phantom fourth
//! vertex `v3 = v0 + n`, where `n = (e0 × e1) / sqrt(|e0 × e1|)`. Scaling the
//! normal by the square root of the cross-product norm keeps the third column
//! commensurate with the edge lengths, so the 3×3 surface matrix
//! `[e0 | e1 | n]` is invertible for every non-degenerate triangle.
//!
//! The deformation gradient of a face is `Q = Vd · inv(Vr)`. Because `Q` is
//! linear in the four tetrahedron corners, it can be written as a 9×4
//! operator acting on each coordinate axis separately: the
//! [`GradientOperator`].

use glam::{DMat3, DVec3};

use deform_types::constants::SINGULAR_DETERMINANT;

/// 9×4 gradient-transfer operator.
///
/// Row `axis * 3 + j` maps the `axis` coordinate of the four corners
/// `(v0, v1, v2, v3)` onto the row-major entry `Q[axis][j]` of the
/// deformation gradient. The three axis blocks hold identical coefficients.
pub type GradientOperator = [[f64; 4]; 9];

/// Row-major flattening of the 3×3 identity.
pub const IDENTITY_GRADIENT: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Scaled normal `(e0 × e1) / sqrt(|e0 × e1|)`.
///
/// Returns the zero vector for a zero-area triangle.
pub fn scaled_normal(v0: DVec3, v1: DVec3, v2: DVec3) -> DVec3 {
    let cross = (v1 - v0).cross(v2 - v0);
    let len = cross.length();
    if len > 0.0 {
        cross / len.sqrt()
    } else {
        DVec3::ZERO
    }
}

/// Position of the phantom fourth vertex, `v0 + n`.
pub fn phantom_vertex(v0: DVec3, v1: DVec3, v2: DVec3) -> DVec3 {
    v0 + scaled_normal(v0, v1, v2)
}

/// Surface matrix with columns `e0 = v1 − v0`, `e1 = v2 − v0`, `n`.
pub fn surface_matrix(v0: DVec3, v1: DVec3, v2: DVec3) -> DMat3 {
    DMat3::from_cols(v1 - v0, v2 - v0, scaled_normal(v0, v1, v2))
}

/// Inverse of [`surface_matrix`].
///
/// `None` for a degenerate triangle (zero area or a determinant that is
/// not a finite, non-negligible number).
pub fn inverse_surface_matrix(v0: DVec3, v1: DVec3, v2: DVec3) -> Option<DMat3> {
    invert(&surface_matrix(v0, v1, v2))
}

/// Inverse of a 3×3 matrix, `None` when it is numerically singular.
pub fn invert(m: &DMat3) -> Option<DMat3> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_DETERMINANT {
        return None;
    }
    let inv = m.inverse();
    inv.is_finite().then_some(inv)
}

/// Builds the 9×4 operator `E` from an inverse surface matrix.
///
/// For each axis block and row `j`: column 0 is
/// `−(invS[0][j] + invS[1][j] + invS[2][j])`, columns 1..=3 are
/// `invS[0][j], invS[1][j], invS[2][j]`.
pub fn gradient_transfer_operator(inv_surface: &DMat3) -> GradientOperator {
    // glam is column-major: invS[i][j] == col(j)[i]
    let mut block = [[0.0f64; 4]; 3];
    for (j, row) in block.iter_mut().enumerate() {
        let col = inv_surface.col(j);
        row[0] = -(col.x + col.y + col.z);
        row[1] = col.x;
        row[2] = col.y;
        row[3] = col.z;
    }

    let mut op = [[0.0f64; 4]; 9];
    for axis in 0..3 {
        op[axis * 3..axis * 3 + 3].copy_from_slice(&block);
    }
    op
}

/// Applies `E` to the four tetrahedron corners, yielding the row-major
/// entries of the deformation gradient.
pub fn apply_operator(op: &GradientOperator, corners: &[DVec3; 4]) -> [f64; 9] {
    let mut out = [0.0f64; 9];
    for (row, value) in out.iter_mut().enumerate() {
        let axis = row / 3;
        *value = op[row]
            .iter()
            .zip(corners)
            .map(|(&e, p)| e * p[axis])
            .sum();
    }
    out
}

/// Deformation gradient `Q = Vd · inv(Vr)`.
pub fn deformation_gradient(inv_reference: &DMat3, deformed: &DMat3) -> DMat3 {
    *deformed * *inv_reference
}

/// Row-major flattening of a 3×3 matrix: index `r * 3 + c` holds `m[r][c]`.
pub fn flatten_row_major(m: &DMat3) -> [f64; 9] {
    // Columns of the transpose are the rows of `m`.
    m.transpose().to_cols_array()
}
