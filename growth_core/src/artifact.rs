//! On-disk persistence of a trained estimator.
//!
//! One species owns four files under the storage base directory:
//!
//! | file | contents |
//! |------|----------|
//! | `<prefix>_model.json` | architecture document (layers + compile config) |
//! | `<prefix>_model.bin` | versioned weight blob |
//! | `all_mae_avg_<prefix>.csv` | averaged validation MAE, header `0` |
//! | `<prefix>_normalization.json` | training-partition feature stats |
//!
//! The architecture document is the presence marker and is always written
//! last, so a partially saved artifact reads as absent.
//!
//! Training holds `<prefix>.lock`, which records the owner's PID. A lock whose
//! owner has exited, or which is older than `storage.lock_lease`, is reclaimed.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checkpoint::{write_atomic, CheckpointError, Checkpointable};
use crate::config::{Species, StorageConfig};
use crate::data::NormalizationStats;
use crate::error::{GrowthError, Result};
use crate::neural::{CompileConfig, NetworkSpec, NetworkWeights, RegressionNetwork};
use crate::training::ValidationHistory;

const ARCHITECTURE_FORMAT_VERSION: u32 = 1;
const HISTORY_HEADER: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArchitectureDocument {
    format_version: u32,
    species: Species,
    #[serde(flatten)]
    network: NetworkSpec,
}

/// Reads and writes the artifact files of one species.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    storage: StorageConfig,
    species: Species,
}

impl ArtifactStore {
    pub fn new(storage: StorageConfig, species: Species) -> Self {
        Self { storage, species }
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn base_dir(&self) -> &Path {
        &self.storage.base_dir
    }

    pub fn architecture_path(&self) -> PathBuf {
        self.file(format!("{}_model.json", self.species.prefix()))
    }

    pub fn weights_path(&self) -> PathBuf {
        self.file(format!("{}_model.bin", self.species.prefix()))
    }

    pub fn history_path(&self) -> PathBuf {
        self.file(format!("all_mae_avg_{}.csv", self.species.prefix()))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.file(format!("{}_normalization.json", self.species.prefix()))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.file(format!("{}.lock", self.species.prefix()))
    }

    fn file(&self, name: String) -> PathBuf {
        self.storage.base_dir.join(name)
    }

    /// True when the architecture document is present. A weight blob without
    /// a document does not count.
    pub fn exists(&self) -> bool {
        self.architecture_path().is_file()
    }

    /// Persists a trained network with its averaged history and the stats
    /// its inputs were normalized with.
    pub fn save(
        &self,
        network: &RegressionNetwork,
        history: &ValidationHistory,
        stats: &NormalizationStats,
    ) -> Result<()> {
        fs::create_dir_all(&self.storage.base_dir)?;

        network.weights().save_checkpoint(self.weights_path())?;

        let curve = history.averaged();
        write_atomic(self.history_path(), |writer| -> Result<()> {
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer.write_record([HISTORY_HEADER])?;
            for value in &curve {
                csv_writer.write_record([value.to_string()])?;
            }
            csv_writer.flush()?;
            Ok(())
        })?;

        write_atomic(self.stats_path(), |writer| -> Result<()> {
            serde_json::to_writer_pretty(&mut *writer, stats)?;
            Ok(())
        })?;

        let document = ArchitectureDocument {
            format_version: ARCHITECTURE_FORMAT_VERSION,
            species: self.species,
            network: network.spec(),
        };
        write_atomic(self.architecture_path(), |writer| -> Result<()> {
            serde_json::to_writer_pretty(&mut *writer, &document)?;
            writer.write_all(b"\n")?;
            Ok(())
        })?;

        tracing::info!(
            species = self.species.name(),
            dir = %self.storage.base_dir.display(),
            epochs = curve.len(),
            "artifact saved"
        );
        Ok(())
    }

    fn read_document(&self) -> Result<ArchitectureDocument> {
        let path = self.architecture_path();
        let file = open_artifact(&path)?;
        let document: ArchitectureDocument = serde_json::from_reader(BufReader::new(file))?;
        if document.format_version != ARCHITECTURE_FORMAT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: ARCHITECTURE_FORMAT_VERSION,
                found: document.format_version,
            }
            .into());
        }
        if document.species != self.species {
            return Err(CheckpointError::InvalidFormat(format!(
                "architecture document belongs to {}, expected {}",
                document.species.name(),
                self.species.name()
            ))
            .into());
        }
        Ok(document)
    }

    /// Rebuilds the network from the architecture document, applies the
    /// weight blob and recompiles it.
    pub fn load(&self) -> Result<RegressionNetwork> {
        let document = self.read_document()?;
        let spec = document.network;

        let weights_path = self.weights_path();
        if !weights_path.is_file() {
            return Err(GrowthError::ArtifactMissing(weights_path));
        }
        let weights = NetworkWeights::load_checkpoint(&weights_path)?;
        spec.validate_weights(&weights)?;

        let mut network = spec.build_zeroed()?;
        network.set_weights(weights)?;
        let compile = spec
            .compile
            .clone()
            .unwrap_or_else(|| CompileConfig::rmsprop(self.species.default_learning_rate()));
        network.compile(compile);

        tracing::debug!(species = self.species.name(), "artifact loaded");
        Ok(network)
    }

    /// Averaged validation MAE curve, one value per epoch, as persisted.
    pub fn load_history(&self) -> Result<Vec<f64>> {
        let path = self.history_path();
        let file = open_artifact(&path)?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let column = reader
            .headers()?
            .iter()
            .position(|header| header.trim() == HISTORY_HEADER)
            .ok_or_else(|| GrowthError::MissingColumn(HISTORY_HEADER.to_string()))?;

        let mut curve = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let cell = record.get(column).unwrap_or_default().trim();
            let value = cell.parse::<f64>().map_err(|_| {
                GrowthError::Dataset(format!(
                    "history row {} holds non-numeric value '{cell}'",
                    line + 1
                ))
            })?;
            curve.push(value);
        }
        Ok(curve)
    }

    pub fn load_stats(&self) -> Result<NormalizationStats> {
        let path = self.stats_path();
        let file = open_artifact(&path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Takes the per-species training lock. Fails with
    /// [`GrowthError::TrainingInProgress`] while a live holder exists; a stale
    /// lock is removed and the acquisition retried once.
    pub fn acquire_training_lock(&self) -> Result<TrainingLock> {
        fs::create_dir_all(&self.storage.base_dir)?;
        let path = self.lock_path();
        if let Some(lock) = TrainingLock::try_create(&path)? {
            return Ok(lock);
        }

        if let Some(reason) = stale_reason(&path, self.storage.lock_lease)? {
            tracing::warn!(path = %path.display(), reason, "reclaiming stale training lock");
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            if let Some(lock) = TrainingLock::try_create(&path)? {
                return Ok(lock);
            }
        }
        Err(GrowthError::TrainingInProgress(path))
    }
}

/// Why an existing lock file no longer protects a running trainer, if it doesn't.
fn stale_reason(path: &Path, lease: Duration) -> Result<Option<&'static str>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Some("released")),
        Err(err) => return Err(err.into()),
    };
    // A modification time in the future counts as a fresh lock.
    let age = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .unwrap_or_default();
    if age >= lease {
        return Ok(Some("lease expired"));
    }

    let owner = match fs::read_to_string(path) {
        Ok(owner) => owner,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Some("released")),
        Err(err) => return Err(err.into()),
    };
    match owner.trim().parse::<u32>() {
        Err(_) => Ok(Some("unreadable owner")),
        Ok(pid) if !process_alive(pid) => Ok(Some("owner exited")),
        Ok(_) => Ok(None),
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id() || Path::new("/proc").join(pid.to_string()).exists()
}

// Without a portable liveness check only the lease expires a lock.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn open_artifact(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            GrowthError::ArtifactMissing(path.to_path_buf())
        } else {
            GrowthError::Io(err)
        }
    })
}

/// Held for the duration of a training run; removes the lock file on drop.
#[derive(Debug)]
pub struct TrainingLock {
    path: PathBuf,
}

static LOCK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

impl TrainingLock {
    /// Publishes a fully written owner file with `hard_link`, which fails if
    /// the lock already exists. Returns `None` when another lock is in place.
    fn try_create(path: &Path) -> Result<Option<Self>> {
        let mut staging = path.as_os_str().to_os_string();
        staging.push(format!(
            ".{}-{}",
            std::process::id(),
            LOCK_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        let staging = PathBuf::from(staging);

        fs::write(&staging, format!("{}\n", std::process::id()))?;
        let linked = fs::hard_link(&staging, path);
        if let Err(err) = fs::remove_file(&staging) {
            tracing::warn!(path = %staging.display(), %err, "failed to remove lock staging file");
        }

        match linked {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TrainingLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %err, "failed to release training lock");
        }
    }
}
