//! Typed request schema for the prediction boundary.
//!
//! Requests arrive as JSON objects. Numeric fields accept numbers or numeric
//! strings; anything else is rejected with an [`ErrorResponse`] instead of
//! reaching the estimator.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::config::Species;
use crate::error::{GrowthError, Result};
use crate::estimator::RegressionEstimator;

const SUCCESS_MESSAGE: &str = "request successfully";
const FAILURE_MESSAGE: &str = "Something error has occurred";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn into_f64(self) -> std::result::Result<f64, String> {
        match self {
            Numeric::Number(value) => Ok(value),
            Numeric::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{text}' is not a number")),
        }
    }
}

fn numeric<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer)?
        .into_f64()
        .map_err(serde::de::Error::custom)
}

fn numeric_vec<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(values) = Option::<Vec<Numeric>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    values
        .into_iter()
        .map(Numeric::into_f64)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

fn numeric_matrix<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Vec<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(rows) = Option::<Vec<Vec<Numeric>>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(Numeric::into_f64)
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Single ratio-scored prediction request. All fields are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRequest {
    #[serde(deserialize_with = "numeric")]
    pub min_proteins: f64,
    #[serde(deserialize_with = "numeric")]
    pub tritatable_acid: f64,
    #[serde(deserialize_with = "numeric")]
    pub ph_sour: f64,
    #[serde(deserialize_with = "numeric")]
    pub fat_milk: f64,
    #[serde(deserialize_with = "numeric")]
    pub target_bacterian: f64,
}

impl SingleRequest {
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|err| GrowthError::InvalidPayload(err.to_string()))
    }

    /// Feature vector in network order.
    pub fn features(&self) -> [f64; 4] {
        [self.min_proteins, self.tritatable_acid, self.ph_sour, self.fat_milk]
    }
}

/// Batch prediction request. The JSON keys carry the species prefix, e.g.
/// `lact_values` / `lact_target`. Missing keys select reporting mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub values: Option<Vec<Vec<f64>>>,
    pub targets: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawList {
    #[serde(default, deserialize_with = "numeric_matrix")]
    values: Option<Vec<Vec<f64>>>,
    #[serde(default, deserialize_with = "numeric_vec")]
    target: Option<Vec<f64>>,
}

impl ListRequest {
    pub fn from_value(species: Species, value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| GrowthError::InvalidPayload("request body must be an object".into()))?;

        let prefix = species.prefix();
        let mut raw = serde_json::Map::new();
        for (field, key) in [
            ("values", format!("{prefix}_values")),
            ("target", format!("{prefix}_target")),
        ] {
            if let Some(entry) = object.get(&key) {
                raw.insert(field.to_string(), entry.clone());
            }
        }

        let raw = RawList::deserialize(Value::Object(raw))
            .map_err(|err| GrowthError::InvalidPayload(err.to_string()))?;
        Ok(Self {
            values: raw.values,
            targets: raw.target,
        })
    }
}

/// Failure body returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
}

impl From<&GrowthError> for ErrorResponse {
    fn from(err: &GrowthError) -> Self {
        Self {
            message: FAILURE_MESSAGE.to_string(),
            error: format!("Error in {err}"),
        }
    }
}

fn failure(err: &GrowthError) -> Value {
    tracing::warn!(%err, "request failed");
    json!(ErrorResponse::from(err))
}

/// Validates `body` as a [`SingleRequest`] and renders the scored prediction
/// inside the `{"data": {...}}` envelope.
pub fn handle_single(estimator: &RegressionEstimator, body: &Value) -> Value {
    let request = match SingleRequest::from_value(body) {
        Ok(request) => request,
        Err(err) => return failure(&err),
    };

    match estimator.predict_single(
        Some(request.features().as_slice()),
        Some(request.target_bacterian),
    ) {
        Ok(prediction) => json!({
            "data": {
                "message": SUCCESS_MESSAGE,
                "prediction": [prediction],
            }
        }),
        Err(err) => failure(&err),
    }
}

/// Validates `body` as a [`ListRequest`] for the estimator's species and
/// renders the result inside the `{"data": ...}` envelope.
pub fn handle_list(estimator: &RegressionEstimator, body: &Value) -> Value {
    let request = match ListRequest::from_value(estimator.config().species, body) {
        Ok(request) => request,
        Err(err) => return failure(&err),
    };

    match estimator.predict_list(request.values.as_deref(), request.targets.as_deref()) {
        Ok(result) => json!({ "data": result }),
        Err(err) => failure(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request_coerces_numeric_strings() {
        let body = json!({
            "minProteins": "3.1",
            "tritatableAcid": 0.7,
            "phSour": " 4.5 ",
            "fatMilk": 3,
            "targetBacterian": "50"
        });
        let request = SingleRequest::from_value(&body).unwrap();
        assert_eq!(request.features(), [3.1, 0.7, 4.5, 3.0]);
        assert_eq!(request.target_bacterian, 50.0);
    }

    #[test]
    fn test_single_request_requires_every_field() {
        let body = json!({ "minProteins": 1, "tritatableAcid": 2, "phSour": 3, "fatMilk": 4 });
        let err = SingleRequest::from_value(&body).unwrap_err();
        assert!(matches!(err, GrowthError::InvalidPayload(ref msg) if msg.contains("targetBacterian")));
    }

    #[test]
    fn test_single_request_rejects_text() {
        let body = json!({
            "minProteins": "lots",
            "tritatableAcid": 1,
            "phSour": 1,
            "fatMilk": 1,
            "targetBacterian": 1
        });
        assert!(SingleRequest::from_value(&body).is_err());
    }

    #[test]
    fn test_list_request_uses_species_keys() {
        let body = json!({
            "strep_values": [[1, "2", 3, 4], [5, 6, 7, 8]],
            "strep_target": [10, "11"],
            "lact_values": [[0, 0, 0, 0]]
        });
        let request = ListRequest::from_value(Species::Streptococcus, &body).unwrap();
        assert_eq!(
            request.values,
            Some(vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]])
        );
        assert_eq!(request.targets, Some(vec![10.0, 11.0]));

        let lact = ListRequest::from_value(Species::Lactobacillus, &body).unwrap();
        assert_eq!(lact.values, Some(vec![vec![0.0; 4]]));
        assert_eq!(lact.targets, None);
    }

    #[test]
    fn test_list_request_rejects_non_object() {
        let err = ListRequest::from_value(Species::Lactobacillus, &json!([1, 2])).unwrap_err();
        assert!(err.is_value_error());
    }

    #[test]
    fn test_error_response_shape() {
        let err = GrowthError::InvalidPayload("missing field `phSour`".into());
        let value = json!(ErrorResponse::from(&err));
        assert_eq!(value["message"], FAILURE_MESSAGE);
        assert!(value["error"].as_str().unwrap().starts_with("Error in "));
    }
}
