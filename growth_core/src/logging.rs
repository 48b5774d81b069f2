//! Logging setup and the JSON line-delimited training journal.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Installs a formatted `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`). Returns `false` if a subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// One cross-validation epoch as written to the journal.
#[derive(Debug, Clone, Serialize)]
pub struct EpochLogEntry {
    pub species: String,
    pub fold: usize,
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_mae: f32,
    pub timestamp_ms: u128,
}

impl EpochLogEntry {
    pub fn new(species: &str, fold: usize, epoch: usize, train_loss: f32, val_loss: f32, val_mae: f32) -> Self {
        Self {
            species: species.to_string(),
            fold,
            epoch,
            train_loss,
            val_loss,
            val_mae,
            timestamp_ms: timestamp_ms(),
        }
    }
}

/// Append-only JSONL journal of training epochs.
#[derive(Debug, Clone, Default)]
pub struct TrainingJournal {
    path: Option<PathBuf>,
}

impl TrainingJournal {
    /// Journal writing to `<base_dir>/logs/<prefix>_run.jsonl`.
    pub fn in_dir<P: AsRef<Path>>(base_dir: P, prefix: &str) -> Self {
        Self {
            path: Some(
                base_dir
                    .as_ref()
                    .join("logs")
                    .join(format!("{prefix}_run.jsonl")),
            ),
        }
    }

    /// Journal that discards every record.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, entry: &EpochLogEntry) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        append_json_line(path, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_appends_json_lines() {
        let dir = std::env::temp_dir().join(format!("growth_journal_{}", uuid::Uuid::new_v4()));
        let journal = TrainingJournal::in_dir(&dir, "lact");

        journal
            .record(&EpochLogEntry::new("lactobacillus", 0, 0, 1.5, 1.2, 0.9))
            .unwrap();
        journal
            .record(&EpochLogEntry::new("lactobacillus", 0, 1, 1.1, 1.0, 0.8))
            .unwrap();

        let contents = fs::read_to_string(journal.path().unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["epoch"], 1);
        assert_eq!(lines[0]["species"], "lactobacillus");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disabled_journal_writes_nothing() {
        let journal = TrainingJournal::disabled();
        assert!(journal.path().is_none());
        journal
            .record(&EpochLogEntry::new("streptococcus", 1, 2, 0.0, 0.0, 0.0))
            .unwrap();
    }
}
