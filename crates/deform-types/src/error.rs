//! Error types for the deform toolkit.
//!
//! All crates return `DeformResult<T>` from fallible operations.

use thiserror::Error;

/// Unified error type for the deform toolkit.
#[derive(Debug, Error)]
pub enum DeformError {
    /// Mesh data is malformed or inconsistent.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// A correspondence references ids outside its valid range.
    #[error("Invalid correspondence: {0}")]
    InvalidCorrespondence(String),

    /// A text input could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A triangle has zero area, so its surface matrix cannot be inverted.
    #[error("Degenerate face {face}: surface matrix is singular")]
    DegenerateFace { face: usize },

    /// Sparse factorization or solve failed.
    #[error("Solver failure: {0}")]
    Solver(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two inputs that must agree in size do not.
    #[error("Size mismatch for {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// File extension or content format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for `Result<T, DeformError>`.
pub type DeformResult<T> = Result<T, DeformError>;
