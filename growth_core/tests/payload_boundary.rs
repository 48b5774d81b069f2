mod common;

use std::fs;

use growth_core::{handle_list, handle_single, RegressionEstimator, Species};
use serde_json::json;

use common::{quick_config, scratch_dir, write_dataset};

#[test]
fn single_request_renders_data_envelope() -> anyhow::Result<()> {
    let dir = scratch_dir("payload_single");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::open(quick_config(Species::Lactobacillus, &dir), &csv)?;

    let response = handle_single(
        &estimator,
        &json!({
            "minProteins": "3.1",
            "tritatableAcid": 0.7,
            "phSour": 4.5,
            "fatMilk": "3.2",
            "targetBacterian": 50
        }),
    );

    assert_eq!(response["data"]["message"], "request successfully");
    let prediction = &response["data"]["prediction"][0];
    assert_eq!(prediction["index"], 1);
    assert_eq!(prediction["target_data"], 50.0);
    assert!(prediction["prediction_range"].as_str().unwrap().ends_with('%'));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn invalid_single_request_is_rejected_before_prediction() -> anyhow::Result<()> {
    let dir = scratch_dir("payload_invalid");
    let csv = write_dataset(&dir);
    let estimator =
        RegressionEstimator::from_csv_path(quick_config(Species::Lactobacillus, &dir), &csv)?;

    let response = handle_single(&estimator, &json!({ "minProteins": 3.1 }));
    assert_eq!(response["message"], "Something error has occurred");
    assert!(response["error"].as_str().unwrap().contains("invalid request payload"));
    assert!(!estimator.store().exists());

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn list_request_modes() -> anyhow::Result<()> {
    let dir = scratch_dir("payload_list");
    let csv = write_dataset(&dir);
    let estimator = RegressionEstimator::open(quick_config(Species::Streptococcus, &dir), &csv)?;

    let history = handle_list(&estimator, &json!({}));
    assert_eq!(history["data"]["mean_absolute_error"].as_array().unwrap().len(), 5);

    let predicted = handle_list(
        &estimator,
        &json!({
            "strep_values": [[2.8, 0.66, 4.35, 3.2], ["3.4", 0.72, 4.5, 3.6]],
            "strep_target": [60.0, 61.5]
        }),
    );
    assert_eq!(predicted["data"]["predictions"].as_array().unwrap().len(), 2);
    assert_eq!(predicted["data"]["targets"], json!([60.0, 61.5]));

    let mismatched = handle_list(
        &estimator,
        &json!({ "strep_values": [[2.8, 0.66]], "strep_target": [60.0] }),
    );
    let message = mismatched["data"]["message"].as_str().unwrap();
    assert!(message.starts_with("Error by: "), "{message}");

    fs::remove_dir_all(&dir).ok();
    Ok(())
}
