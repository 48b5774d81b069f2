//! Estimator configuration via TOML files.
//!
//! Every key is optional; missing sections fall back to the defaults the
//! production estimators were trained with (6 folds, 90 epochs, batch 16,
//! learning rate 0.0155, 30% test split with seed 42).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bacterial species an estimator is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Lactobacillus,
    Streptococcus,
}

impl Species {
    pub fn name(&self) -> &'static str {
        match self {
            Species::Lactobacillus => "lactobacillus",
            Species::Streptococcus => "streptococcus",
        }
    }

    /// Column holding the regression target for this species.
    pub fn target_column(&self) -> &'static str {
        match self {
            Species::Lactobacillus => "lactobacillus_initial_strain_cfu_ml",
            Species::Streptococcus => "streptococcus_initial_strain_cfu_ml",
        }
    }

    /// Columns never used as features: the other species' target and the
    /// auxiliary quality/temperature fields.
    pub fn excluded_columns(&self) -> Vec<&'static str> {
        let other = match self {
            Species::Lactobacillus => Species::Streptococcus,
            Species::Streptococcus => Species::Lactobacillus,
        };
        vec![
            other.target_column(),
            "quality_product",
            "ideal_temperature_c",
        ]
    }

    /// Short prefix used for artifact filenames and payload keys.
    pub fn prefix(&self) -> &'static str {
        match self {
            Species::Lactobacillus => "lact",
            Species::Streptococcus => "strep",
        }
    }

    pub fn default_learning_rate(&self) -> f32 {
        0.0155
    }
}

impl std::str::FromStr for Species {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lactobacillus" | "lact" => Ok(Species::Lactobacillus),
            "streptococcus" | "strep" => Ok(Species::Streptococcus),
            other => Err(ConfigError::Parse(format!("unknown species '{other}'"))),
        }
    }
}

/// What to do with a feature column that is constant on the training partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVariancePolicy {
    /// Fail the split with [`crate::GrowthError::DegenerateFeature`].
    #[default]
    Reject,
    /// Remove the column from the network input, at training and inference.
    Drop,
}

/// How the network evolves across cross-validation folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategy {
    /// One network keeps learning from fold to fold.
    #[default]
    CarryOver,
    /// A freshly initialized network is trained at each fold.
    Independent,
}

/// Train/test partition parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitConfig {
    /// Fraction of rows held out as the test partition.
    pub test_fraction: f64,
    /// Seed of the row permutation.
    pub seed: u64,
    pub zero_variance: ZeroVariancePolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            seed: 42,
            zero_variance: ZeroVariancePolicy::Reject,
        }
    }
}

/// Cross-validation parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub folds: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub fold_strategy: FoldStrategy,
    /// Seed for weight initialization; `None` draws from OS entropy.
    pub init_seed: Option<u64>,
    /// Seed of the per-epoch mini-batch shuffle.
    pub shuffle_seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            folds: 6,
            epochs: 90,
            batch_size: 16,
            fold_strategy: FoldStrategy::CarryOver,
            init_seed: None,
            shuffle_seed: 42,
        }
    }
}

/// Where artifacts and the training journal live.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    /// Append per-epoch records to `<base_dir>/logs/<prefix>_run.jsonl`.
    pub journal: bool,
    /// Age after which a training lock is treated as abandoned.
    pub lock_lease: Duration,
}

impl StorageConfig {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            journal: true,
            lock_lease: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("model_training")
    }
}

/// Prediction-time behavior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceConfig {
    /// Apply the persisted training normalization to prediction inputs.
    /// `false` feeds raw measurements to the network (legacy behavior).
    pub normalize_inputs: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            normalize_inputs: true,
        }
    }
}

/// Complete configuration of one species estimator.
///
/// # Examples
///
/// ```
/// use growth_core::{EstimatorConfig, Species};
///
/// let config = EstimatorConfig::from_str("[estimator]\nspecies = \"streptococcus\"")
///     .expect("valid config");
/// assert_eq!(config.species, Species::Streptococcus);
/// assert_eq!(config.training.folds, 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatorConfig {
    pub species: Species,
    pub learning_rate: f32,
    pub split: SplitConfig,
    pub training: TrainingConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
}

impl EstimatorConfig {
    /// Default configuration for `species`.
    pub fn for_species(species: Species) -> Self {
        Self {
            species,
            learning_rate: species.default_learning_rate(),
            split: SplitConfig::default(),
            training: TrainingConfig::default(),
            storage: StorageConfig::default(),
            inference: InferenceConfig::default(),
        }
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let species = raw.estimator.species.unwrap_or(Species::Lactobacillus);
        let learning_rate = raw
            .estimator
            .learning_rate
            .unwrap_or_else(|| species.default_learning_rate());
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(ConfigError::Parse(
                "estimator.learning_rate must be positive".into(),
            ));
        }

        let config = Self {
            species,
            learning_rate,
            split: SplitConfig::try_from(raw.split)?,
            training: TrainingConfig::try_from(raw.training)?,
            storage: StorageConfig {
                base_dir: raw
                    .storage
                    .base_dir
                    .unwrap_or_else(|| StorageConfig::default().base_dir),
                journal: raw.storage.journal.unwrap_or(true),
                lock_lease: raw
                    .storage
                    .lock_lease_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| StorageConfig::default().lock_lease),
            },
            inference: InferenceConfig {
                normalize_inputs: raw.inference.normalize_inputs.unwrap_or(true),
            },
        };

        Ok(config)
    }
}

impl SplitConfig {
    fn try_from(raw: RawSplit) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let test_fraction = raw.test_fraction.unwrap_or(defaults.test_fraction);
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(ConfigError::Parse(
                "split.test_fraction must lie strictly between 0 and 1".into(),
            ));
        }

        Ok(Self {
            test_fraction,
            seed: raw.seed.unwrap_or(defaults.seed),
            zero_variance: raw.zero_variance.unwrap_or(defaults.zero_variance),
        })
    }
}

impl TrainingConfig {
    fn try_from(raw: RawTraining) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let folds = raw.folds.unwrap_or(defaults.folds);
        if folds < 2 {
            return Err(ConfigError::Parse("training.folds must be >= 2".into()));
        }
        let epochs = raw.epochs.unwrap_or(defaults.epochs);
        if epochs == 0 {
            return Err(ConfigError::Parse("training.epochs must be >= 1".into()));
        }
        let batch_size = raw.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::Parse("training.batch_size must be >= 1".into()));
        }

        Ok(Self {
            folds,
            epochs,
            batch_size,
            fold_strategy: raw.fold_strategy.unwrap_or(defaults.fold_strategy),
            init_seed: raw.init_seed,
            shuffle_seed: raw.shuffle_seed.unwrap_or(defaults.shuffle_seed),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    estimator: RawEstimator,
    #[serde(default)]
    split: RawSplit,
    #[serde(default)]
    training: RawTraining,
    #[serde(default)]
    storage: RawStorage,
    #[serde(default)]
    inference: RawInference,
}

#[derive(Debug, Default, Deserialize)]
struct RawEstimator {
    species: Option<Species>,
    learning_rate: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSplit {
    test_fraction: Option<f64>,
    seed: Option<u64>,
    zero_variance: Option<ZeroVariancePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTraining {
    folds: Option<usize>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    fold_strategy: Option<FoldStrategy>,
    init_seed: Option<u64>,
    shuffle_seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    base_dir: Option<PathBuf>,
    journal: Option<bool>,
    lock_lease_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInference {
    normalize_inputs: Option<bool>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}
