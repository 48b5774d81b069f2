//! K-fold cross-validated training.
//!
//! The training partition is cut into `folds` contiguous chunks of
//! `n / folds` rows. Fold `i` validates on chunk `i` and trains on every row
//! before and after it, so rows past `folds * chunk` are only ever trained on.
//! The per-epoch validation MAE of every fold is averaged element-wise into
//! the curve that is persisted for accuracy reporting.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::{FoldStrategy, TrainingConfig};
use crate::error::{GrowthError, Result};
use crate::logging::{EpochLogEntry, TrainingJournal};
use crate::neural::{ModelBuilder, RegressionNetwork};

/// Validation MAE per epoch, one sequence per fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationHistory {
    folds: Vec<Vec<f32>>,
}

impl ValidationHistory {
    pub fn from_folds(folds: Vec<Vec<f32>>) -> Self {
        Self { folds }
    }

    pub fn folds(&self) -> &[Vec<f32>] {
        &self.folds
    }

    pub fn num_folds(&self) -> usize {
        self.folds.len()
    }

    fn push_fold(&mut self, curve: Vec<f32>) {
        self.folds.push(curve);
    }

    /// Element-wise mean over folds; length = epoch count.
    pub fn averaged(&self) -> Vec<f64> {
        let epochs = self.folds.iter().map(Vec::len).max().unwrap_or(0);
        (0..epochs)
            .map(|epoch| {
                let values: Vec<f64> = self
                    .folds
                    .iter()
                    .filter_map(|fold| fold.get(epoch))
                    .map(|&v| f64::from(v))
                    .collect();
                values.iter().sum::<f64>() / values.len() as f64
            })
            .collect()
    }
}

/// Output of a cross-validation run.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Network state after the last fold.
    pub network: RegressionNetwork,
    pub history: ValidationHistory,
}

/// Row range `[start, end)` used as validation data by each fold.
pub fn fold_ranges(rows: usize, folds: usize) -> Result<Vec<(usize, usize)>> {
    if folds < 2 {
        return Err(GrowthError::InsufficientData(format!(
            "cross-validation needs at least 2 folds, got {folds}"
        )));
    }
    let chunk = rows / folds;
    if chunk == 0 {
        return Err(GrowthError::InsufficientData(format!(
            "{rows} training rows cannot fill {folds} folds"
        )));
    }
    Ok((0..folds).map(|i| (i * chunk, (i + 1) * chunk)).collect())
}

/// Runs k-fold cross-validation over a training partition.
#[derive(Debug, Clone)]
pub struct CrossValidationTrainer {
    config: TrainingConfig,
    builder: ModelBuilder,
    journal: TrainingJournal,
    label: String,
}

impl CrossValidationTrainer {
    /// `builder` re-initializes the network per fold under
    /// [`FoldStrategy::Independent`].
    pub fn new(config: TrainingConfig, builder: ModelBuilder) -> Self {
        Self {
            config,
            builder,
            journal: TrainingJournal::disabled(),
            label: String::from("estimator"),
        }
    }

    pub fn with_journal(mut self, journal: TrainingJournal, label: impl Into<String>) -> Self {
        self.journal = journal;
        self.label = label.into();
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn fresh_network(&self, fold: usize, inputs: usize) -> Result<RegressionNetwork> {
        let builder = match self.builder.seed() {
            Some(seed) => self.builder.clone().with_seed(seed.wrapping_add(fold as u64)),
            None => self.builder.clone(),
        };
        builder.build(inputs)
    }

    /// Trains `network` fold by fold and returns it with the validation history.
    pub fn train(
        &self,
        features: ArrayView2<f32>,
        targets: ArrayView1<f32>,
        network: RegressionNetwork,
    ) -> Result<TrainedModel> {
        if features.nrows() != targets.len() {
            return Err(GrowthError::shape(
                "training targets",
                features.nrows(),
                targets.len(),
            ));
        }
        if self.config.epochs == 0 || self.config.batch_size == 0 {
            return Err(GrowthError::InsufficientData(
                "epochs and batch size must be positive".into(),
            ));
        }

        let rows = features.nrows();
        let ranges = fold_ranges(rows, self.config.folds)?;
        let mut rng = StdRng::seed_from_u64(self.config.shuffle_seed);
        let mut network = network;
        let mut history = ValidationHistory::default();

        tracing::info!(
            estimator = %self.label,
            rows,
            folds = self.config.folds,
            epochs = self.config.epochs,
            parameters = network.num_parameters(),
            "starting cross-validation"
        );
        let start_time = Instant::now();

        for (fold, &(start, end)) in ranges.iter().enumerate() {
            if fold > 0 && self.config.fold_strategy == FoldStrategy::Independent {
                network = self.fresh_network(fold, features.ncols())?;
            }

            let val_x = features.slice(ndarray::s![start..end, ..]);
            let val_y = targets.slice(ndarray::s![start..end]);
            let train_rows: Vec<usize> = (0..start).chain(end..rows).collect();
            let train_x = features.select(Axis(0), &train_rows);
            let train_y = targets.select(Axis(0), &train_rows);

            let mut curve = Vec::with_capacity(self.config.epochs);
            for epoch in 0..self.config.epochs {
                let train_loss = network.fit_epoch(
                    train_x.view(),
                    train_y.view(),
                    self.config.batch_size,
                    &mut rng,
                )?;
                let evaluation = network.evaluate(val_x, val_y)?;
                curve.push(evaluation.mean_absolute_error);

                tracing::debug!(
                    fold,
                    epoch,
                    train_loss,
                    val_mae = evaluation.mean_absolute_error,
                    "epoch complete"
                );
                let entry = EpochLogEntry::new(
                    &self.label,
                    fold,
                    epoch,
                    train_loss,
                    evaluation.loss,
                    evaluation.mean_absolute_error,
                );
                if let Err(err) = self.journal.record(&entry) {
                    tracing::warn!(%err, "failed to append training journal");
                }
            }

            tracing::info!(
                fold = fold + 1,
                of = self.config.folds,
                final_val_mae = curve.last().copied().unwrap_or_default(),
                "fold complete"
            );
            history.push_fold(curve);
        }

        tracing::info!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "cross-validation finished"
        );

        Ok(TrainedModel { network, history })
    }
}
