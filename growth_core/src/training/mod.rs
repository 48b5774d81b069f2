//! Training procedures for regression networks.

pub mod cross_validation;

pub use cross_validation::{fold_ranges, CrossValidationTrainer, TrainedModel, ValidationHistory};
