//! Species estimator: explicit training lifecycle plus prediction entry points.

use std::path::Path;

use crate::artifact::ArtifactStore;
use crate::config::EstimatorConfig;
use crate::data::{DataSplitter, Dataset};
use crate::error::Result;
use crate::logging::TrainingJournal;
use crate::neural::{Evaluation, ModelBuilder};
use crate::prediction::{ListPrediction, PredictionService, SinglePrediction};
use crate::training::CrossValidationTrainer;

/// What [`RegressionEstimator::train_if_absent`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    /// An artifact already existed; nothing was trained.
    Skipped,
    Trained {
        /// Averaged validation MAE per epoch, as persisted.
        history: Vec<f64>,
        /// Final network scored on the held-out test partition.
        test: Evaluation,
    },
}

/// Regression estimator for one species, backed by an [`ArtifactStore`].
///
/// Construction never trains. Call [`train_if_absent`](Self::train_if_absent)
/// (or use [`open`](Self::open)) before predicting.
#[derive(Debug, Clone)]
pub struct RegressionEstimator {
    config: EstimatorConfig,
    dataset: Dataset,
    store: ArtifactStore,
}

impl RegressionEstimator {
    pub fn new(config: EstimatorConfig, dataset: Dataset) -> Self {
        let store = ArtifactStore::new(config.storage.clone(), config.species);
        Self {
            config,
            dataset,
            store,
        }
    }

    pub fn from_csv_path<P: AsRef<Path>>(config: EstimatorConfig, path: P) -> Result<Self> {
        let dataset = Dataset::from_csv_path(path)?;
        Ok(Self::new(config, dataset))
    }

    /// Loads the dataset and trains unless an artifact is already present.
    pub fn open<P: AsRef<Path>>(config: EstimatorConfig, path: P) -> Result<Self> {
        let estimator = Self::from_csv_path(config, path)?;
        estimator.train_if_absent()?;
        Ok(estimator)
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Splits, trains with cross-validation and persists the artifact, unless
    /// one exists. Concurrent callers are serialized by the store's lock file.
    pub fn train_if_absent(&self) -> Result<TrainingOutcome> {
        let species = self.config.species;
        if self.store.exists() {
            tracing::info!(species = species.name(), "artifact present, skipping training");
            return Ok(TrainingOutcome::Skipped);
        }

        let _lock = self.store.acquire_training_lock()?;
        if self.store.exists() {
            return Ok(TrainingOutcome::Skipped);
        }

        let splitter = DataSplitter::new(self.config.split.clone());
        let split = splitter.split(
            &self.dataset,
            species.target_column(),
            &species.excluded_columns(),
        )?;
        tracing::info!(
            species = species.name(),
            train_rows = split.train_rows.len(),
            test_rows = split.test_rows.len(),
            features = split.stats.output_width(),
            "training partition ready"
        );

        let mut builder = ModelBuilder::new(self.config.learning_rate);
        if let Some(seed) = self.config.training.init_seed {
            builder = builder.with_seed(seed);
        }
        let network = builder.build(split.stats.output_width())?;

        let journal = if self.config.storage.journal {
            TrainingJournal::in_dir(&self.config.storage.base_dir, species.prefix())
        } else {
            TrainingJournal::disabled()
        };
        let trainer = CrossValidationTrainer::new(self.config.training.clone(), builder)
            .with_journal(journal, species.name());
        let trained = trainer.train(
            split.train_features.view(),
            split.train_targets.view(),
            network,
        )?;

        let test = trained
            .network
            .evaluate(split.test_features.view(), split.test_targets.view())?;
        tracing::info!(
            species = species.name(),
            test_loss = test.loss,
            test_mae = test.mean_absolute_error,
            "held-out evaluation"
        );

        self.store.save(&trained.network, &trained.history, &split.stats)?;

        Ok(TrainingOutcome::Trained {
            history: trained.history.averaged(),
            test,
        })
    }

    fn service(&self) -> PredictionService<'_> {
        PredictionService::new(&self.store, self.config.inference.clone())
    }

    /// See [`PredictionService::predict_list`].
    pub fn predict_list(
        &self,
        features: Option<&[Vec<f64>]>,
        targets: Option<&[f64]>,
    ) -> Result<ListPrediction> {
        self.service().predict_list(features, targets)
    }

    /// See [`PredictionService::predict_single`].
    pub fn predict_single(
        &self,
        features: Option<&[f64]>,
        target: Option<f64>,
    ) -> Result<SinglePrediction> {
        self.service().predict_single(features, target)
    }
}
