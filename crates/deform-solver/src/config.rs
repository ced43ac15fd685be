//! Solver configuration.
//!
//! Parameters that control the correspondence resolver (weight schedule,
//! match limits) and the transfer solver (vertex dedup, regularization).
//! Both load from TOML through serde; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use deform_types::constants::{
    DEFAULT_CLOSEST_SCHEDULE, DEFAULT_IDENTITY_WEIGHT, DEFAULT_MAX_CORRESPONDENCES,
    DEFAULT_SMOOTHNESS_WEIGHT, DEFAULT_TRANSFER_REGULARIZATION,
};
use deform_types::{DeformError, DeformResult};

/// Term weights of one resolver stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageWeights {
    /// Weight of the adjacent-face gradient difference.
    pub smoothness: f64,
    /// Weight pulling each face gradient toward the identity.
    pub identity: f64,
    /// Weight pulling free vertices onto their nearest target vertex.
    /// The term is left out entirely at 0.
    pub closest: f64,
}

impl StageWeights {
    pub fn new(smoothness: f64, identity: f64, closest: f64) -> Self {
        Self {
            smoothness,
            identity,
            closest,
        }
    }

    fn validate(&self, stage: usize) -> DeformResult<()> {
        for (name, w) in [
            ("smoothness", self.smoothness),
            ("identity", self.identity),
            ("closest", self.closest),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(DeformError::InvalidConfig(format!(
                    "stage {stage}: {name} weight must be finite and non-negative, got {w}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the correspondence resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Weight schedule, one solve per entry. An empty schedule skips the
    /// solves and matches faces on the undeformed source.
    pub stages: Vec<StageWeights>,

    /// Maximum source faces kept per target face (0 keeps all).
    pub max_correspondences: usize,

    /// Match a target face to the nearest facing source face when none
    /// lies within the threshold.
    pub fallback_to_nearest: bool,

    /// Recompute vertex normals of both meshes on configure and of the
    /// working mesh after every stage.
    pub recompute_normals: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stages: DEFAULT_CLOSEST_SCHEDULE
                .iter()
                .map(|&closest| {
                    StageWeights::new(DEFAULT_SMOOTHNESS_WEIGHT, DEFAULT_IDENTITY_WEIGHT, closest)
                })
                .collect(),
            max_correspondences: DEFAULT_MAX_CORRESPONDENCES,
            fallback_to_nearest: false,
            recompute_normals: true,
        }
    }
}

impl ResolverConfig {
    /// Single stage with the given weights.
    pub fn single_stage(weights: StageWeights) -> Self {
        Self {
            stages: vec![weights],
            ..Default::default()
        }
    }

    /// Checks every stage weight.
    pub fn validate(&self) -> DeformResult<()> {
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate(i)?;
        }
        Ok(())
    }
}

/// Configuration for the deformation transfer solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Collapse target vertices at exactly equal positions into one unknown.
    pub dedup_vertices: bool,

    /// Relative Tikhonov weight on the real-vertex unknowns, scaled by the
    /// mean diagonal of AᵀA. Pins the translation null space. 0 disables it.
    pub regularization: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            dedup_vertices: false,
            regularization: DEFAULT_TRANSFER_REGULARIZATION,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> DeformResult<()> {
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(DeformError::InvalidConfig(format!(
                "regularization must be finite and non-negative, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Combined configuration file: `[resolver]` and `[transfer]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformConfig {
    pub resolver: ResolverConfig,
    pub transfer: TransferConfig,
}

impl DeformConfig {
    pub fn validate(&self) -> DeformResult<()> {
        self.resolver.validate()?;
        self.transfer.validate()
    }
}
