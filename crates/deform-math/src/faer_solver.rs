//! Sparse Cholesky solver backed by `faer`.
//!
//! Implements the [`SparseSolver`] trait using faer's supernodal LLᵀ
//! factorization over the normal equations `AᵀA x = Aᵀc`.
//!
//! ## Workflow
//! 1. `factorize(matrix)`: converts CSR to CSC, computes symbolic + numeric LLᵀ
//! 2. `solve(rhs, solution)`: forward/backward substitution (cached factorization)
//! 3. Repeat `solve()` with different RHS without re-factorizing

use faer::Side;
use faer::linalg::solvers::Solve;
use faer::sparse::SparseColMat;
use faer::sparse::Triplet;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};

use crate::sparse::{CsrMatrix, SparseSolver};

/// Sparse Cholesky (LLᵀ) solver using `faer`.
///
/// Stores the factorization for reuse across multiple solves. The transfer
/// system depends only on the target reference and the correspondence, so
/// one factorization serves every deformed pose.
pub struct FaerSolver {
    /// Cached LLᵀ factorization.
    factorization: Option<Llt<usize, f64>>,
    /// Matrix dimension (N×N).
    dimension: usize,
}

impl FaerSolver {
    /// Creates a new solver (unfactorized).
    pub fn new() -> Self {
        Self {
            factorization: None,
            dimension: 0,
        }
    }

    /// Dimension of the last factorized matrix.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Drops any cached factorization.
    pub fn reset(&mut self) {
        self.factorization = None;
        self.dimension = 0;
    }

    /// Convert our CSR matrix to faer's CSC matrix.
    ///
    /// Only the upper triangle is passed on, which is all `Side::Upper` reads.
    fn csr_to_csc(matrix: &CsrMatrix) -> Result<SparseColMat<usize, f64>, String> {
        let triplets: Vec<Triplet<usize, usize, f64>> = matrix
            .triplets()
            .filter(|&(row, col, _)| row <= col)
            .map(|(row, col, val)| Triplet { row, col, val })
            .collect();

        SparseColMat::try_new_from_triplets(matrix.rows, matrix.cols, &triplets)
            .map_err(|e| format!("Failed to construct faer CSC matrix: {e:?}"))
    }
}

impl Default for FaerSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseSolver for FaerSolver {
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String> {
        // A failed attempt never leaves a stale factorization behind.
        self.reset();

        if matrix.rows != matrix.cols {
            return Err(format!(
                "Matrix must be square, got {}×{}",
                matrix.rows, matrix.cols
            ));
        }
        if matrix.rows == 0 {
            return Err("Cannot factorize empty matrix".into());
        }
        if matrix.values.iter().any(|v| !v.is_finite()) {
            return Err("Matrix contains non-finite entries".into());
        }

        let csc = Self::csr_to_csc(matrix)?;

        // Step 1: Symbolic analysis (ordering, fill-in prediction)
        let symbolic = SymbolicLlt::try_new(csc.symbolic().as_ref(), Side::Upper)
            .map_err(|e| format!("Symbolic analysis failed: {e:?}"))?;

        // Step 2: Numeric factorization (using the symbolic structure)
        let llt = Llt::try_new_with_symbolic(symbolic, csc.as_ref(), Side::Upper)
            .map_err(|e| format!("Cholesky factorization failed: {e:?}"))?;

        self.dimension = matrix.rows;
        self.factorization = Some(llt);
        Ok(())
    }

    fn solve(&self, rhs: &[f64], solution: &mut [f64]) -> Result<(), String> {
        let llt = self
            .factorization
            .as_ref()
            .ok_or_else(|| "Solver not factorized. Call factorize() first.".to_string())?;

        if rhs.len() != self.dimension {
            return Err(format!(
                "RHS length ({}) != matrix dimension ({})",
                rhs.len(),
                self.dimension
            ));
        }
        if solution.len() != self.dimension {
            return Err(format!(
                "Solution length ({}) != matrix dimension ({})",
                solution.len(),
                self.dimension
            ));
        }

        let rhs_col: faer::Mat<f64> = faer::Mat::from_fn(self.dimension, 1, |i, _| rhs[i]);

        // Solve using cached factorization: L Lᵀ x = b
        let sol = llt.solve(&rhs_col);

        for (i, out) in solution.iter_mut().enumerate() {
            *out = sol[(i, 0)];
        }

        if solution.iter().any(|v| !v.is_finite()) {
            return Err("Solve produced non-finite values".into());
        }
        Ok(())
    }

    fn is_factorized(&self) -> bool {
        self.factorization.is_some()
    }
}
