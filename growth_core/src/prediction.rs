//! Inference against a persisted artifact.
//!
//! Every call reloads the network from storage. Without inputs both
//! operations fall back to reporting mode and return the persisted averaged
//! validation curve.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::config::InferenceConfig;
use crate::error::{GrowthError, Result};
use crate::neural::RegressionNetwork;

/// Result of [`PredictionService::predict_list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListPrediction {
    Predictions {
        index: u32,
        predictions: Vec<f64>,
        targets: Vec<f64>,
    },
    History {
        mean_absolute_error: Vec<f64>,
    },
    /// Input shape problem, reported instead of failing the call.
    Message { message: String },
}

/// Result of [`PredictionService::predict_single`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SinglePrediction {
    Scored {
        index: u32,
        value_predicted: f64,
        /// Ratio score, e.g. `"80.00%"`.
        prediction_range: String,
        target_data: f64,
    },
    History {
        mean_absolute_error: Vec<f64>,
    },
}

/// Closeness of `predicted` to `target` as a percentage: the smaller value
/// divided by the larger, times 100.
///
/// ```
/// use growth_core::prediction::ratio_score;
///
/// assert_eq!(ratio_score(40.0, 50.0).unwrap(), 80.0);
/// assert_eq!(ratio_score(50.0, 40.0).unwrap(), 80.0);
/// assert!(ratio_score(0.0, 40.0).is_err());
/// ```
pub fn ratio_score(predicted: f64, target: f64) -> Result<f64> {
    if !predicted.is_finite() || !target.is_finite() {
        return Err(GrowthError::Domain(format!(
            "ratio of non-finite values {predicted} and {target}"
        )));
    }
    if predicted == 0.0 || target == 0.0 {
        return Err(GrowthError::Domain(format!(
            "ratio score undefined for prediction {predicted} and target {target}"
        )));
    }

    let score = if predicted > target {
        target / predicted * 100.0
    } else {
        predicted / target * 100.0
    };
    Ok(score)
}

/// Formats a ratio score with two decimals and a percent sign.
pub fn format_percentage(score: f64) -> String {
    format!("{score:.2}%")
}

/// Serves list and single predictions for one species.
#[derive(Debug)]
pub struct PredictionService<'a> {
    store: &'a ArtifactStore,
    config: InferenceConfig,
}

impl<'a> PredictionService<'a> {
    pub fn new(store: &'a ArtifactStore, config: InferenceConfig) -> Self {
        Self { store, config }
    }

    fn history(&self) -> Result<Vec<f64>> {
        self.store.load_history()
    }

    /// Predicts every row of `features`, pairing the outputs with `targets`.
    ///
    /// Returns the validation history unless both arguments are given. Width
    /// or length mismatches come back as [`ListPrediction::Message`].
    pub fn predict_list(
        &self,
        features: Option<&[Vec<f64>]>,
        targets: Option<&[f64]>,
    ) -> Result<ListPrediction> {
        let (Some(features), Some(targets)) = (features, targets) else {
            return Ok(ListPrediction::History {
                mean_absolute_error: self.history()?,
            });
        };

        match self.predict_rows(features, targets) {
            Ok(predictions) => Ok(ListPrediction::Predictions {
                index: 1,
                predictions,
                targets: targets.to_vec(),
            }),
            Err(err) if err.is_value_error() => {
                tracing::warn!(%err, "list prediction rejected");
                Ok(ListPrediction::Message {
                    message: format!("Error by: {err}"),
                })
            }
            Err(err) => Err(err),
        }
    }

    fn predict_rows(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<Vec<f64>> {
        if features.len() != targets.len() {
            return Err(GrowthError::shape(
                "prediction targets",
                features.len(),
                targets.len(),
            ));
        }

        let network = self.store.load()?;
        let inputs = self.prepare(&network, features)?;
        let outputs = network.predict(inputs.view())?;
        Ok(outputs.iter().map(|&value| f64::from(value)).collect())
    }

    /// Predicts one value and scores it against `target`.
    ///
    /// Shape and domain errors propagate.
    pub fn predict_single(
        &self,
        features: Option<&[f64]>,
        target: Option<f64>,
    ) -> Result<SinglePrediction> {
        let (Some(features), Some(target)) = (features, target) else {
            return Ok(SinglePrediction::History {
                mean_absolute_error: self.history()?,
            });
        };

        let network = self.store.load()?;
        let inputs = self.prepare(&network, &[features.to_vec()])?;
        let predicted = network
            .predict(inputs.view())?
            .first()
            .copied()
            .map(f64::from)
            .ok_or_else(|| GrowthError::InsufficientData("network returned no output".into()))?;

        let score = ratio_score(predicted, target)?;
        tracing::debug!(predicted, target, score, "single prediction");

        Ok(SinglePrediction::Scored {
            index: 1,
            value_predicted: predicted,
            prediction_range: format_percentage(score),
            target_data: target,
        })
    }

    /// Turns raw measurement rows into network input.
    fn prepare(&self, network: &RegressionNetwork, rows: &[Vec<f64>]) -> Result<Array2<f32>> {
        if self.config.normalize_inputs {
            let stats = self.store.load_stats()?;
            let raw = to_matrix(rows, stats.input_width())?;
            return stats.transform(raw.view());
        }

        match self.store.load_stats() {
            Ok(stats) => {
                let raw = to_matrix(rows, stats.input_width())?;
                stats.passthrough(raw.view())
            }
            Err(GrowthError::ArtifactMissing(_)) => {
                Ok(to_matrix(rows, network.input_width())?.mapv(|value| value as f32))
            }
            Err(err) => Err(err),
        }
    }
}

fn to_matrix(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>> {
    let mut values = Vec::with_capacity(rows.len() * width);
    for row in rows {
        if row.len() != width {
            return Err(GrowthError::shape("feature vector", width, row.len()));
        }
        values.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), width), values)
        .map_err(|err| GrowthError::InvalidPayload(err.to_string()))
}
