#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use growth_core::{EstimatorConfig, Species, StorageConfig};

pub const ROWS: usize = 60;

/// Fermentation table with the production column layout.
pub fn fermentation_csv() -> String {
    let mut csv = String::from(
        "streptococcus_initial_strain_cfu_ml,lactobacillus_initial_strain_cfu_ml,ideal_temperature_c,\
         min_proteins,titratable_acid,ph_sour,fat_milk,quality_product\n",
    );
    for i in 0..ROWS {
        let proteins = 2.5 + (i % 7) as f64 * 0.3;
        let acid = 0.6 + ((i * 3) % 11) as f64 * 0.02;
        let ph = 4.2 + ((i * 5) % 13) as f64 * 0.05;
        let fat = 3.0 + ((i * 2) % 9) as f64 * 0.1;
        let lact = 40.0 + 5.0 * proteins - 20.0 * acid + 3.0 * ph + fat;
        let strep = 55.0 - 2.0 * proteins + 15.0 * acid - ph + 2.0 * fat;
        let _ = writeln!(
            csv,
            "{strep:.4},{lact:.4},42,{proteins:.2},{acid:.2},{ph:.2},{fat:.2},{}",
            i % 3
        );
    }
    csv
}

pub fn scratch_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("growth_{label}_{}", uuid::Uuid::new_v4()))
}

pub fn write_dataset(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create scratch dir");
    let path = dir.join("fermentation.csv");
    std::fs::write(&path, fermentation_csv()).expect("write dataset");
    path
}

/// Small, seeded configuration so a full training run stays fast.
pub fn quick_config(species: Species, base_dir: &Path) -> EstimatorConfig {
    let mut config =
        EstimatorConfig::for_species(species).with_storage(StorageConfig::new(base_dir.join("model_training")));
    config.training.folds = 3;
    config.training.epochs = 5;
    config.training.init_seed = Some(7);
    config
}
