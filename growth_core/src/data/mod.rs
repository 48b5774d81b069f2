//! Tabular measurements and their train/test preparation.

pub mod dataset;
pub mod split;

pub use dataset::Dataset;
pub use split::{DataSplitter, NormalizationStats, SplitData};
