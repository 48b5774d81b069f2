//! # Growth Core
//!
//! Regression estimators for the initial strain concentration of
//! *Lactobacillus* and *Streptococcus* in fermented milk, predicted from four
//! chemical measurements (minimum proteins, titratable acid, pH sourness and
//! milk fat).
//!
//! Each species is served by a [`RegressionEstimator`]: a 16-16-4-1 dense
//! network trained with k-fold cross-validation and persisted as a single
//! latest artifact. Training is explicit and idempotent.
//!
//! ## Quick Start
//!
//! ```no_run
//! use growth_core::{EstimatorConfig, RegressionEstimator, Species};
//!
//! let config = EstimatorConfig::for_species(Species::Lactobacillus);
//! let estimator = RegressionEstimator::open(config, "data/fermentation.csv")?;
//!
//! let scored = estimator.predict_single(Some(&[3.1, 0.7, 4.5, 3.2]), Some(50.0))?;
//! println!("{}", serde_json::to_string(&scored)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Estimator configuration via TOML
//! - [`data`] - Dataset loading, train/test split and normalization
//! - [`neural`] - Dense layers, RMSprop and the fixed network topology
//! - [`training`] - K-fold cross-validation
//! - [`artifact`] - Atomic persistence of trained networks
//! - [`prediction`] - List and ratio-scored single predictions
//! - [`payload`] - Request validation for the prediction boundary
//! - [`logging`] - Tracing setup and the JSONL training journal

pub mod artifact;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod estimator;
pub mod logging;
pub mod neural;
pub mod payload;
pub mod prediction;
pub mod training;

pub use artifact::{ArtifactStore, TrainingLock};
pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{
    ConfigError, EstimatorConfig, FoldStrategy, InferenceConfig, Species, SplitConfig,
    StorageConfig, TrainingConfig, ZeroVariancePolicy,
};
pub use data::{DataSplitter, Dataset, NormalizationStats, SplitData};
pub use error::{GrowthError, Result};
pub use estimator::{RegressionEstimator, TrainingOutcome};
pub use logging::{init_tracing, EpochLogEntry, TrainingJournal};
pub use neural::{ModelBuilder, RegressionNetwork};
pub use payload::{handle_list, handle_single, ErrorResponse, ListRequest, SingleRequest};
pub use prediction::{ratio_score, ListPrediction, PredictionService, SinglePrediction};
pub use training::{CrossValidationTrainer, TrainedModel, ValidationHistory};
