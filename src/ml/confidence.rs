//! Linear confidence model
//!
//! `sigmoid(intercept + sum(w_i * x_i))` over the normalized feature vector,
//! reported as a percentage.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::features::{FeatureVector, FEATURE_COUNT};
use super::linalg::{dot, round_to, sigmoid};
use super::registry::ModelError;

const MODEL_NAME: &str = "confidence";

#[derive(Debug, Deserialize)]
struct ConfidenceWeightsWire {
    version: String,
    #[serde(default)]
    intercept: f64,
    weights: BTreeMap<String, f64>,
}

/// Validated weights laid out in feature order
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceModel {
    version: String,
    intercept: f64,
    weights: [f64; FEATURE_COUNT],
}

impl ConfidenceModel {
    /// Parse `{version, intercept, weights: {featureName: w}}`
    ///
    /// Unnamed features weigh zero; an unknown feature name is rejected.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let wire: ConfidenceWeightsWire = serde_json::from_str(json)?;
        if !wire.intercept.is_finite() {
            return Err(ModelError::Invalid {
                model: MODEL_NAME.to_string(),
                detail: "intercept is not finite".to_string(),
            });
        }

        let mut weights = [0.0; FEATURE_COUNT];
        for (name, weight) in &wire.weights {
            let idx = FeatureVector::index_of(name).ok_or_else(|| ModelError::UnknownFeature {
                model: MODEL_NAME.to_string(),
                feature: name.clone(),
            })?;
            if !weight.is_finite() {
                return Err(ModelError::Invalid {
                    model: MODEL_NAME.to_string(),
                    detail: format!("weight for {name} is not finite"),
                });
            }
            weights[idx] = *weight;
        }

        Ok(Self {
            version: wire.version,
            intercept: wire.intercept,
            weights,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Win confidence in percent, two decimals
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let logit = self.intercept + dot(&self.weights, &features.normalized());
        round_to(sigmoid(logit) * 100.0, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_logit_is_fifty() {
        let model =
            ConfidenceModel::from_json(r#"{"version": "v", "intercept": 0.0, "weights": {}}"#)
                .unwrap();
        assert_eq!(model.predict(&FeatureVector::default()), 50.0);
    }

    #[test]
    fn test_weights_move_prediction() {
        let model = ConfidenceModel::from_json(
            r#"{"version": "v", "intercept": -1.0, "weights": {"confluenceScore": 2.5}}"#,
        )
        .unwrap();
        let features = FeatureVector {
            confluence_score: 4.0,
            ..Default::default()
        };
        // sigmoid(-1 + 2.5 * 0.8) = sigmoid(1)
        assert_eq!(model.predict(&features), 73.11);
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let err = ConfidenceModel::from_json(
            r#"{"version": "v", "intercept": 0.0, "weights": {"moonPhase": 1.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnknownFeature { .. }));
    }
}
