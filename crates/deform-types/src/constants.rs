//! Solver defaults and numerical thresholds.

/// Default smoothness weight for every resolver stage.
pub const DEFAULT_SMOOTHNESS_WEIGHT: f64 = 1.0;

/// Default identity weight for every resolver stage.
pub const DEFAULT_IDENTITY_WEIGHT: f64 = 0.1;

/// Closest-point weights of the default five-stage resolver schedule.
pub const DEFAULT_CLOSEST_SCHEDULE: [f64; 5] = [0.0, 1.0, 30.0, 40.0, 50.0];

/// Maximum number of source faces recorded per target face.
pub const DEFAULT_MAX_CORRESPONDENCES: usize = 3;

/// Relative Tikhonov weight that pins the translation null space
/// of the transfer system (scaled by the mean diagonal of AᵀA).
pub const DEFAULT_TRANSFER_REGULARIZATION: f64 = 1.0e-8;

/// Determinant magnitude below which a surface matrix is treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1.0e-300;

/// Tolerance used when testing barycentric coordinates for containment.
pub const BARYCENTRIC_EPSILON: f64 = 1.0e-9;

/// Triangle area at or below which mesh validation reports a face as
/// degenerate.
pub const DEGENERATE_AREA_EPSILON: f64 = 1.0e-20;

/// Largest element count a dense correspondence file may declare.
pub const MAX_CORRESPONDENCE_ELEMENTS: usize = 1 << 26;
