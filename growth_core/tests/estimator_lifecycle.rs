mod common;

use std::fs;
use std::time::Duration;

use growth_core::{
    ArtifactStore, CrossValidationTrainer, DataSplitter, Dataset, GrowthError, ListPrediction,
    ModelBuilder, RegressionEstimator, SinglePrediction, Species, TrainingOutcome,
};

use common::{quick_config, scratch_dir, write_dataset, ROWS};

#[test]
fn trains_once_then_skips() -> anyhow::Result<()> {
    let dir = scratch_dir("lifecycle");
    let csv = write_dataset(&dir);
    let config = quick_config(Species::Lactobacillus, &dir);
    let estimator = RegressionEstimator::from_csv_path(config, &csv)?;

    assert!(!estimator.store().exists());
    let history = match estimator.train_if_absent()? {
        TrainingOutcome::Trained { history, test } => {
            assert!(test.mean_absolute_error.is_finite());
            history
        }
        TrainingOutcome::Skipped => panic!("first run must train"),
    };
    assert_eq!(history.len(), 5);

    let store = estimator.store();
    assert!(store.exists());
    assert!(store.weights_path().ends_with("lact_model.bin"));
    assert!(store.weights_path().is_file());
    assert!(store.stats_path().is_file());
    assert!(!store.lock_path().exists());

    let journal = store.base_dir().join("logs").join("lact_run.jsonl");
    let records = fs::read_to_string(&journal)?.lines().count();
    assert_eq!(records, 3 * 5);

    assert_eq!(estimator.train_if_absent()?, TrainingOutcome::Skipped);
    assert_eq!(fs::read_to_string(&journal)?.lines().count(), records);

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn reporting_mode_returns_persisted_history() -> anyhow::Result<()> {
    let dir = scratch_dir("history");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::from_csv_path(quick_config(Species::Lactobacillus, &dir), &csv)?;

    let TrainingOutcome::Trained { history, .. } = estimator.train_if_absent()? else {
        panic!("expected a training run");
    };

    assert_eq!(
        estimator.predict_list(None, None)?,
        ListPrediction::History { mean_absolute_error: history.clone() }
    );
    assert_eq!(
        estimator.predict_single(None, None)?,
        SinglePrediction::History { mean_absolute_error: history }
    );

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn list_predictions_match_input_count() -> anyhow::Result<()> {
    let dir = scratch_dir("list");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::open(quick_config(Species::Streptococcus, &dir), &csv)?;

    let rows = vec![
        vec![2.8, 0.66, 4.35, 3.2],
        vec![3.4, 0.72, 4.5, 3.6],
        vec![2.5, 0.6, 4.2, 3.0],
        vec![4.0, 0.8, 4.8, 3.8],
    ];
    let targets = vec![60.0, 61.5, 58.0, 63.0];
    match estimator.predict_list(Some(&rows), Some(&targets))? {
        ListPrediction::Predictions { predictions, targets: echoed, .. } => {
            assert_eq!(predictions.len(), rows.len());
            assert!(predictions.iter().all(|p| p.is_finite()));
            assert_eq!(echoed, targets);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(estimator.store().architecture_path().ends_with("strep_model.json"));
    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn single_prediction_formats_ratio() -> anyhow::Result<()> {
    let dir = scratch_dir("single");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::open(quick_config(Species::Lactobacillus, &dir), &csv)?;

    match estimator.predict_single(Some(&[3.1, 0.7, 4.5, 3.2]), Some(50.0))? {
        SinglePrediction::Scored { value_predicted, prediction_range, target_data, index } => {
            assert_eq!(index, 1);
            assert_eq!(target_data, 50.0);
            let score = growth_core::ratio_score(value_predicted, 50.0)?;
            assert_eq!(prediction_range, format!("{score:.2}%"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let err = estimator
        .predict_single(Some(&[3.1, 0.7, 4.5]), Some(50.0))
        .unwrap_err();
    assert!(matches!(err, GrowthError::ShapeMismatch { expected: 4, got: 3, .. }));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn saved_network_reproduces_in_memory_predictions() -> anyhow::Result<()> {
    let dir = scratch_dir("roundtrip");
    let dataset = Dataset::from_reader(common::fermentation_csv().as_bytes())?;
    assert_eq!(dataset.len(), ROWS);

    let config = quick_config(Species::Lactobacillus, &dir);
    let species = config.species;
    let split = DataSplitter::new(config.split.clone()).split(
        &dataset,
        species.target_column(),
        &species.excluded_columns(),
    )?;
    let builder = ModelBuilder::new(config.learning_rate).with_seed(11);
    let network = builder.build(split.stats.output_width())?;
    let trained = CrossValidationTrainer::new(config.training.clone(), builder).train(
        split.train_features.view(),
        split.train_targets.view(),
        network,
    )?;

    let store = ArtifactStore::new(config.storage.clone(), species);
    store.save(&trained.network, &trained.history, &split.stats)?;
    let loaded = store.load()?;

    assert_eq!(loaded.spec(), trained.network.spec());
    let expected = trained.network.predict(split.test_features.view())?;
    let actual = loaded.predict(split.test_features.view())?;
    for (a, b) in expected.iter().zip(actual.iter()) {
        approx::assert_abs_diff_eq!(a, b, epsilon = 1e-5);
    }

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn concurrent_training_is_refused() -> anyhow::Result<()> {
    let dir = scratch_dir("lock");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::from_csv_path(quick_config(Species::Lactobacillus, &dir), &csv)?;

    let lock = estimator.store().acquire_training_lock()?;
    let err = estimator.train_if_absent().unwrap_err();
    assert!(matches!(err, GrowthError::TrainingInProgress(_)));
    assert!(!estimator.store().exists());

    drop(lock);
    assert!(matches!(estimator.train_if_absent()?, TrainingOutcome::Trained { .. }));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn abandoned_lock_does_not_block_training() -> anyhow::Result<()> {
    let dir = scratch_dir("stale_lock");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::from_csv_path(quick_config(Species::Streptococcus, &dir), &csv)?;

    // Lock left behind by a trainer that has since exited.
    let mut trainer = std::process::Command::new("true").spawn()?;
    let pid = trainer.id();
    trainer.wait()?;
    fs::create_dir_all(estimator.store().base_dir())?;
    fs::write(estimator.store().lock_path(), format!("{pid}\n"))?;

    assert!(matches!(estimator.train_if_absent()?, TrainingOutcome::Trained { .. }));
    assert!(estimator.store().exists());
    assert!(!estimator.store().lock_path().exists());

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn expired_lock_lease_does_not_block_training() -> anyhow::Result<()> {
    let dir = scratch_dir("lease");
    let csv = write_dataset(&dir);
    let mut config = quick_config(Species::Lactobacillus, &dir);
    config.storage.lock_lease = Duration::from_secs(0);
    let estimator = RegressionEstimator::from_csv_path(config, &csv)?;

    fs::create_dir_all(estimator.store().base_dir())?;
    fs::write(estimator.store().lock_path(), format!("{}\n", std::process::id()))?;

    assert!(matches!(estimator.train_if_absent()?, TrainingOutcome::Trained { .. }));
    assert!(!estimator.store().lock_path().exists());

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn prediction_without_artifact_fails() -> anyhow::Result<()> {
    let dir = scratch_dir("missing");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::from_csv_path(quick_config(Species::Lactobacillus, &dir), &csv)?;

    let err = estimator
        .predict_single(Some(&[3.1, 0.7, 4.5, 3.2]), Some(50.0))
        .unwrap_err();
    assert!(matches!(err, GrowthError::ArtifactMissing(_)));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}
