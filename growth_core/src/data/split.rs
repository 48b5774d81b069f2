//! Deterministic train/test partitioning and z-score normalization.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::{SplitConfig, ZeroVariancePolicy};
use crate::data::Dataset;
use crate::error::{GrowthError, Result};

/// Per-feature mean and standard deviation fitted on the training partition.
///
/// The same stats transform the test partition and every inference input;
/// they are never refitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Feature columns expected at the input, in order.
    pub columns: Vec<String>,
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
    /// Indices into `columns` that reach the network.
    pub retained: Vec<usize>,
}

impl NormalizationStats {
    /// Fits population mean/std per column of `features`.
    pub fn fit(
        columns: &[String],
        features: ArrayView2<f64>,
        policy: ZeroVariancePolicy,
    ) -> Result<Self> {
        if features.ncols() != columns.len() {
            return Err(GrowthError::shape(
                "normalization fit",
                columns.len(),
                features.ncols(),
            ));
        }
        if features.nrows() == 0 {
            return Err(GrowthError::InsufficientData(
                "cannot fit normalization on an empty partition".into(),
            ));
        }

        let means = features
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        let std_devs = features.std_axis(Axis(0), 0.0).to_vec();

        let mut retained = Vec::with_capacity(columns.len());
        for (index, std) in std_devs.iter().enumerate() {
            if *std > f64::EPSILON {
                retained.push(index);
                continue;
            }
            match policy {
                ZeroVariancePolicy::Reject => {
                    return Err(GrowthError::DegenerateFeature {
                        column: columns[index].clone(),
                    })
                }
                ZeroVariancePolicy::Drop => {
                    tracing::warn!(column = %columns[index], "dropping zero-variance feature");
                }
            }
        }

        if retained.is_empty() {
            return Err(GrowthError::InsufficientData(
                "every feature column has zero variance".into(),
            ));
        }

        Ok(Self {
            columns: columns.to_vec(),
            means,
            std_devs,
            retained,
        })
    }

    /// Number of values each input vector must carry.
    pub fn input_width(&self) -> usize {
        self.columns.len()
    }

    /// Number of values that reach the network.
    pub fn output_width(&self) -> usize {
        self.retained.len()
    }

    /// Scales `features` with the fitted stats, dropping discarded columns.
    pub fn transform(&self, features: ArrayView2<f64>) -> Result<Array2<f32>> {
        if features.ncols() != self.input_width() {
            return Err(GrowthError::shape(
                "feature vector",
                self.input_width(),
                features.ncols(),
            ));
        }

        Ok(Array2::from_shape_fn(
            (features.nrows(), self.retained.len()),
            |(row, col)| {
                let source = self.retained[col];
                ((features[[row, source]] - self.means[source]) / self.std_devs[source]) as f32
            },
        ))
    }

    /// Selects retained columns without scaling (legacy raw inference).
    pub fn passthrough(&self, features: ArrayView2<f64>) -> Result<Array2<f32>> {
        if features.ncols() != self.input_width() {
            return Err(GrowthError::shape(
                "feature vector",
                self.input_width(),
                features.ncols(),
            ));
        }

        Ok(features.select(Axis(1), &self.retained).mapv(|v| v as f32))
    }
}

/// Output of [`DataSplitter::split`].
#[derive(Debug, Clone)]
pub struct SplitData {
    pub train_features: Array2<f32>,
    pub test_features: Array2<f32>,
    pub train_targets: Array1<f32>,
    pub test_targets: Array1<f32>,
    pub stats: NormalizationStats,
    /// Dataset row indices of the training partition, in partition order.
    pub train_rows: Vec<usize>,
    /// Dataset row indices of the test partition, in partition order.
    pub test_rows: Vec<usize>,
}

/// Partitions a [`Dataset`] into normalized train/test matrices.
#[derive(Debug, Clone, Default)]
pub struct DataSplitter {
    config: SplitConfig,
}

impl DataSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Feature columns: every column except the target and the excluded ones.
    pub fn feature_columns(
        dataset: &Dataset,
        target_column: &str,
        excluded_columns: &[&str],
    ) -> Result<Vec<String>> {
        dataset.column_index(target_column)?;
        for excluded in excluded_columns {
            dataset.column_index(excluded)?;
        }

        let features: Vec<String> = dataset
            .columns()
            .iter()
            .filter(|name| name.as_str() != target_column)
            .filter(|name| !excluded_columns.contains(&name.as_str()))
            .cloned()
            .collect();

        if features.is_empty() {
            return Err(GrowthError::InsufficientData(
                "no feature columns remain after exclusions".into(),
            ));
        }
        Ok(features)
    }

    /// Shuffled row permutation for `rows` rows: `(train, test)` indices.
    pub fn partition(&self, rows: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let test_count = (rows as f64 * self.config.test_fraction).ceil() as usize;
        if test_count == 0 || test_count >= rows {
            return Err(GrowthError::InsufficientData(format!(
                "{rows} rows cannot be split with test fraction {}",
                self.config.test_fraction
            )));
        }

        let mut indices: Vec<usize> = (0..rows).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let train = indices.split_off(test_count);
        Ok((train, indices))
    }

    /// Splits `dataset` and normalizes both partitions with training stats.
    pub fn split(
        &self,
        dataset: &Dataset,
        target_column: &str,
        excluded_columns: &[&str],
    ) -> Result<SplitData> {
        let columns = Self::feature_columns(dataset, target_column, excluded_columns)?;
        let features = dataset.select(&columns)?;
        let targets = dataset.column(target_column)?;

        let (train_rows, test_rows) = self.partition(dataset.len())?;
        let raw_train = features.select(Axis(0), &train_rows);
        let raw_test = features.select(Axis(0), &test_rows);

        let stats =
            NormalizationStats::fit(&columns, raw_train.view(), self.config.zero_variance)?;

        tracing::debug!(
            train = train_rows.len(),
            test = test_rows.len(),
            features = stats.output_width(),
            "dataset split"
        );

        Ok(SplitData {
            train_features: stats.transform(raw_train.view())?,
            test_features: stats.transform(raw_test.view())?,
            train_targets: targets.select(Axis(0), &train_rows).mapv(|v| v as f32),
            test_targets: targets.select(Axis(0), &test_rows).mapv(|v| v as f32),
            stats,
            train_rows,
            test_rows,
        })
    }
}
