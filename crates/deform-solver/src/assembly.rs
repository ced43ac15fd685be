//! Least-squares system assembly.
//!
//! Both solvers build an overdetermined system `A x ≈ c` row by row and
//! solve the normal equations `AᵀA x = Aᵀc`.
//!
//! Unknowns come in column blocks of 3, one block per 3D point: column
//! `point * 3 + axis`. Per-face energy terms occupy row blocks of 9
//! (3 axes × 3 gradient entries), point constraints row blocks of 3.

use deform_math::geometry::GradientOperator;
use deform_math::sparse::{CsrMatrix, SparseSolver};
use deform_math::DVec3;
use deform_types::{DeformError, DeformResult};

/// One corner of a face term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Corner {
    /// Unknown point occupying column block `block`.
    Free(usize),
    /// Known point, moved into the constant term.
    Fixed(DVec3),
}

/// Triplet-accumulated sparse system with its constant vector.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    cols: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<f64>,
}

impl LinearSystem {
    /// Empty system over `points` column blocks.
    pub fn new(points: usize) -> Self {
        Self::with_capacity(points, 0)
    }

    /// Empty system with room for `rows` rows.
    pub fn with_capacity(points: usize, rows: usize) -> Self {
        Self {
            cols: points * 3,
            triplets: Vec::with_capacity(rows * 4),
            rhs: Vec::with_capacity(rows),
        }
    }

    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Constant vector `c`.
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Appends `count` zero rows and returns the index of the first.
    pub fn push_rows(&mut self, count: usize) -> usize {
        let first = self.rhs.len();
        self.rhs.resize(first + count, 0.0);
        first
    }

    /// Scatters `scale · E` into the 9 rows starting at `first_row`.
    ///
    /// Row `axis * 3 + j` of the operator touches the `axis` column of
    /// each free corner. Fixed corners contribute `−scale · E · p` to the
    /// constant term instead. Entries already present are summed.
    pub fn add_operator(
        &mut self,
        first_row: usize,
        op: &GradientOperator,
        corners: &[Corner; 4],
        scale: f64,
    ) {
        for (r, coeffs) in op.iter().enumerate() {
            let row = first_row + r;
            let axis = r / 3;
            for (&e, corner) in coeffs.iter().zip(corners) {
                let value = scale * e;
                if value == 0.0 {
                    continue;
                }
                match *corner {
                    Corner::Free(block) => self.triplets.push((row, block * 3 + axis, value)),
                    Corner::Fixed(p) => self.rhs[row] -= value * p[axis],
                }
            }
        }
    }

    /// Adds `scale · values` to the constant term starting at `first_row`.
    pub fn add_constants(&mut self, first_row: usize, values: &[f64], scale: f64) {
        for (c, &v) in self.rhs[first_row..first_row + values.len()]
            .iter_mut()
            .zip(values)
        {
            *c += scale * v;
        }
    }

    /// Appends a 3-row point constraint `weight · (x_block − target)`.
    pub fn push_point(&mut self, block: usize, target: DVec3, weight: f64) {
        let first = self.push_rows(3);
        for axis in 0..3 {
            self.triplets.push((first + axis, block * 3 + axis, weight));
            self.rhs[first + axis] = weight * target[axis];
        }
    }

    /// Compresses the accumulated triplets into `A`.
    pub fn matrix(&self) -> CsrMatrix {
        CsrMatrix::from_triplets(self.rows(), self.cols, &self.triplets)
    }

    /// Number of accumulated (uncompressed) entries.
    pub fn triplet_count(&self) -> usize {
        self.triplets.len()
    }

    /// Factorizes `AᵀA` and returns the least-squares solution.
    pub fn solve_least_squares<S: SparseSolver>(&self, solver: &mut S) -> DeformResult<Vec<f64>> {
        let a = self.matrix();
        let ata = a.normal_matrix();
        let atc = a.transpose_mul_vec(&self.rhs);

        solver
            .factorize(&ata)
            .map_err(|e| DeformError::Solver(format!("Failed to factorize AᵀA: {e}")))?;

        let mut x = vec![0.0; self.cols];
        solver
            .solve(&atc, &mut x)
            .map_err(|e| DeformError::Solver(format!("Failed to solve AᵀA x = Aᵀc: {e}")))?;
        Ok(x)
    }
}

/// Point stored in column block `block` of `x`.
pub fn point_at(x: &[f64], block: usize) -> DVec3 {
    DVec3::new(x[block * 3], x[block * 3 + 1], x[block * 3 + 2])
}
