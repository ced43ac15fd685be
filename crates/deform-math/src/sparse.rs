//! Sparse matrix representation and solver interface.
//!
//! Provides a CSR (Compressed Sparse Row) matrix with the handful of
//! products the least-squares solvers need (transpose, sparse × sparse,
//! sparse × dense vector) and a trait for sparse Cholesky solvers.

use serde::{Deserialize, Serialize};

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores a sparse matrix in row-major order. This is the standard
/// format for sparse linear algebra libraries (faer, SuiteSparse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrMatrix {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Row pointer array (length = rows + 1).
    /// `row_ptr[i]..row_ptr[i+1]` are the indices into `col_idx` and `values`
    /// for non-zeros in row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices of non-zero entries, sorted within each row.
    pub col_idx: Vec<usize>,
    /// Non-zero values.
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Creates an empty CSR matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Returns the number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Creates a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries are summed. Triplets outside `rows × cols`
    /// are a caller bug and panic on indexing.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        // Count entries per row
        let mut row_counts = vec![0usize; rows];
        for &(r, _, _) in triplets {
            row_counts[r] += 1;
        }

        let mut row_ptr = vec![0usize; rows + 1];
        for i in 0..rows {
            row_ptr[i + 1] = row_ptr[i] + row_counts[i];
        }

        // Bucket entries by row, using a running cursor per row
        let mut entries = vec![(0usize, 0.0f64); row_ptr[rows]];
        let mut cursor = row_ptr[..rows].to_vec();
        for &(r, c, v) in triplets {
            debug_assert!(c < cols, "column {c} out of range ({cols})");
            entries[cursor[r]] = (c, v);
            cursor[r] += 1;
        }

        // Sort each row by column and merge duplicates
        let mut col_idx = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        let mut merged_ptr = vec![0usize; rows + 1];

        for i in 0..rows {
            let row = &mut entries[row_ptr[i]..row_ptr[i + 1]];
            row.sort_unstable_by_key(|&(c, _)| c);

            let row_start = col_idx.len();
            for &(c, v) in row.iter() {
                if col_idx.len() > row_start && col_idx[col_idx.len() - 1] == c {
                    let last = values.len() - 1;
                    values[last] += v;
                } else {
                    col_idx.push(c);
                    values.push(v);
                }
            }
            merged_ptr[i + 1] = col_idx.len();
        }

        Self {
            rows,
            cols,
            row_ptr: merged_ptr,
            col_idx,
            values,
        }
    }

    /// Returns the entry at `(row, col)`, or 0.0 if it is not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        match self.col_idx[start..end].binary_search(&col) {
            Ok(pos) => self.values[start + pos],
            Err(_) => 0.0,
        }
    }

    /// Iterates the stored entries as `(row, col, value)` in row order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |r| {
            (self.row_ptr[r]..self.row_ptr[r + 1]).map(move |k| (r, self.col_idx[k], self.values[k]))
        })
    }

    /// Returns the transpose as a new CSR matrix.
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.cols];
        for &c in &self.col_idx {
            counts[c] += 1;
        }

        let mut row_ptr = vec![0usize; self.cols + 1];
        for i in 0..self.cols {
            row_ptr[i + 1] = row_ptr[i] + counts[i];
        }

        let nnz = self.nnz();
        let mut col_idx = vec![0usize; nnz];
        let mut values = vec![0.0f64; nnz];
        let mut cursor = row_ptr[..self.cols].to_vec();

        // Visiting source rows in order keeps the output columns sorted.
        for r in 0..self.rows {
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                let c = self.col_idx[k];
                let pos = cursor[c];
                col_idx[pos] = r;
                values[pos] = self.values[k];
                cursor[c] += 1;
            }
        }

        Self {
            rows: self.cols,
            cols: self.rows,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Sparse × sparse product `self · rhs` (row-wise Gustavson accumulation).
    pub fn mul(&self, rhs: &CsrMatrix) -> Self {
        assert_eq!(
            self.cols, rhs.rows,
            "inner dimensions differ: {}×{} · {}×{}",
            self.rows, self.cols, rhs.rows, rhs.cols
        );

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        row_ptr.push(0);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        // Dense accumulator + marker array, reused across rows
        let mut accum = vec![0.0f64; rhs.cols];
        let mut marker = vec![usize::MAX; rhs.cols];
        let mut touched: Vec<usize> = Vec::new();

        for r in 0..self.rows {
            touched.clear();
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                let a = self.values[k];
                let mid = self.col_idx[k];
                for kk in rhs.row_ptr[mid]..rhs.row_ptr[mid + 1] {
                    let c = rhs.col_idx[kk];
                    if marker[c] != r {
                        marker[c] = r;
                        accum[c] = 0.0;
                        touched.push(c);
                    }
                    accum[c] += a * rhs.values[kk];
                }
            }

            touched.sort_unstable();
            for &c in &touched {
                col_idx.push(c);
                values.push(accum[c]);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows: self.rows,
            cols: rhs.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Normal-equations matrix `AᵀA` of this matrix.
    pub fn normal_matrix(&self) -> Self {
        self.transpose().mul(self)
    }

    /// Dense product `self · x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.cols, "vector length != column count");
        (0..self.rows)
            .map(|r| {
                (self.row_ptr[r]..self.row_ptr[r + 1])
                    .map(|k| self.values[k] * x[self.col_idx[k]])
                    .sum()
            })
            .collect()
    }

    /// Dense product `selfᵀ · y` without materializing the transpose.
    pub fn transpose_mul_vec(&self, y: &[f64]) -> Vec<f64> {
        assert_eq!(y.len(), self.rows, "vector length != row count");
        let mut out = vec![0.0f64; self.cols];
        for (r, &yr) in y.iter().enumerate() {
            if yr == 0.0 {
                continue;
            }
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                out[self.col_idx[k]] += self.values[k] * yr;
            }
        }
        out
    }

    /// Returns the main diagonal (missing entries are 0.0).
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// Returns `self + diag(d)` for a square matrix.
    pub fn add_diagonal(&self, d: &[f64]) -> Self {
        assert_eq!(self.rows, self.cols, "add_diagonal needs a square matrix");
        assert_eq!(d.len(), self.rows, "diagonal length != dimension");

        let mut triplets: Vec<(usize, usize, f64)> = self.triplets().collect();
        triplets.extend(
            d.iter()
                .enumerate()
                .filter(|(_, &v)| v != 0.0)
                .map(|(i, &v)| (i, i, v)),
        );
        Self::from_triplets(self.rows, self.cols, &triplets)
    }
}

/// Trait for sparse symmetric positive-definite solvers.
///
/// Implementations: `FaerSolver`.
pub trait SparseSolver {
    /// Factorize the matrix. Call once (or after the system changes).
    fn factorize(&mut self, matrix: &CsrMatrix) -> Result<(), String>;

    /// Solve Ax = b using the pre-computed factorization.
    /// Returns x in the provided output buffer.
    fn solve(&self, rhs: &[f64], solution: &mut [f64]) -> Result<(), String>;

    /// Returns true if the solver holds a valid factorization.
    fn is_factorized(&self) -> bool;
}
