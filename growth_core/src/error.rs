//! Error types shared by the estimator pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;

/// Result type alias for estimator operations.
pub type Result<T> = std::result::Result<T, GrowthError>;

/// Errors raised while loading data, training, persisting or serving a model.
#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read tabular data: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to (de)serialize JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tabular source is malformed (ragged rows, non-numeric cells, ...).
    #[error("invalid dataset: {0}")]
    Dataset(String),

    #[error("column '{0}' not found in dataset")]
    MissingColumn(String),

    /// A feature column has zero variance on the training partition.
    #[error("feature column '{column}' has zero variance on the training partition")]
    DegenerateFeature { column: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    /// Value outside the domain of an operation (e.g. a zero ratio denominator).
    #[error("domain error: {0}")]
    Domain(String),

    #[error("network must be compiled before training")]
    NotCompiled,

    #[error("no trained artifact found at {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("another training run holds the lock at {}", .0.display())]
    TrainingInProgress(PathBuf),

    #[error("invalid request payload: {0}")]
    InvalidPayload(String),
}

impl GrowthError {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, got: usize) -> Self {
        GrowthError::ShapeMismatch {
            context: context.into(),
            expected,
            got,
        }
    }

    /// True for errors the list-prediction path reports as a message.
    pub fn is_value_error(&self) -> bool {
        matches!(
            self,
            GrowthError::ShapeMismatch { .. } | GrowthError::InvalidPayload(_)
        )
    }
}
