//! Shared model registry
//!
//! Holds an immutable [`ModelSnapshot`] behind a lock that is only held long
//! enough to clone or swap an `Arc`. Readers keep whatever snapshot they
//! grabbed; a load builds a new snapshot and swaps it in whole.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::anomaly::AnomalyForest;
use super::confidence::ConfidenceModel;
use super::iv_forecast::IvForecastModel;
use super::mtf::MtfModel;
use super::tier::TierModel;
use crate::common::traits::WeightsSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Confidence,
    FlowAnomaly,
    IvForecast,
    MtfWeights,
    SetupTier,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Confidence,
        ModelKind::FlowAnomaly,
        ModelKind::IvForecast,
        ModelKind::MtfWeights,
        ModelKind::SetupTier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Confidence => "confidence",
            ModelKind::FlowAnomaly => "flow_anomaly",
            ModelKind::IvForecast => "iv_forecast",
            ModelKind::MtfWeights => "mtf_weights",
            ModelKind::SetupTier => "setup_tier",
        }
    }

    /// Blob file name inside a weights directory
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model load failures
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model weights are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model {model} has a bad shape: {detail}")]
    Shape { model: String, detail: String },

    #[error("Model {model} references unknown feature {feature}")]
    UnknownFeature { model: String, feature: String },

    #[error("Model {model} is invalid: {detail}")]
    Invalid { model: String, detail: String },
}

/// Immutable set of loaded models
#[derive(Debug, Clone, Default)]
pub struct ModelSnapshot {
    pub confidence: Option<Arc<ConfidenceModel>>,
    pub flow_anomaly: Option<Arc<AnomalyForest>>,
    pub iv_forecast: Option<Arc<IvForecastModel>>,
    pub mtf_weights: Option<Arc<MtfModel>>,
    pub setup_tier: Option<Arc<TierModel>>,
    /// Bumped on every swap
    pub generation: u64,
}

impl ModelSnapshot {
    pub fn version(&self, kind: ModelKind) -> Option<&str> {
        match kind {
            ModelKind::Confidence => self.confidence.as_ref().map(|m| m.version()),
            ModelKind::FlowAnomaly => self.flow_anomaly.as_ref().map(|m| m.version()),
            ModelKind::IvForecast => self.iv_forecast.as_ref().map(|m| m.version()),
            ModelKind::MtfWeights => self.mtf_weights.as_ref().map(|m| m.version()),
            ModelKind::SetupTier => self.setup_tier.as_ref().map(|m| m.version()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl ModelRegistry {
    /// Empty registry: every predictor starts on its fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in anomaly forest, IV cell and tier weights
    pub fn with_builtin_defaults() -> Self {
        let iv_forecast = match IvForecastModel::builtin() {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                warn!(error = %e, "Built-in IV forecaster failed validation");
                None
            }
        };
        let setup_tier = match TierModel::builtin() {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                warn!(error = %e, "Built-in tier weights failed validation");
                None
            }
        };
        let snapshot = ModelSnapshot {
            flow_anomaly: Some(Arc::new(AnomalyForest::builtin())),
            iv_forecast,
            setup_tier,
            ..Default::default()
        };
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn swap(&self, update: impl FnOnce(&mut ModelSnapshot)) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = ModelSnapshot::clone(&guard);
        update(&mut next);
        next.generation = guard.generation + 1;
        let generation = next.generation;
        *guard = Arc::new(next);
        generation
    }

    /// Parse and validate a blob, then swap it in
    ///
    /// A blob that fails validation leaves the current snapshot untouched.
    pub fn install(&self, kind: ModelKind, json: &str) -> Result<u64, ModelError> {
        let generation = match kind {
            ModelKind::Confidence => {
                let model = Arc::new(ConfidenceModel::from_json(json)?);
                self.swap(|s| s.confidence = Some(model))
            }
            ModelKind::FlowAnomaly => {
                let model = Arc::new(AnomalyForest::from_json(json)?);
                self.swap(|s| s.flow_anomaly = Some(model))
            }
            ModelKind::IvForecast => {
                let model = Arc::new(IvForecastModel::from_json(json)?);
                self.swap(|s| s.iv_forecast = Some(model))
            }
            ModelKind::MtfWeights => {
                let model = Arc::new(MtfModel::from_json(json)?);
                self.swap(|s| s.mtf_weights = Some(model))
            }
            ModelKind::SetupTier => {
                let model = Arc::new(TierModel::from_json(json)?);
                self.swap(|s| s.setup_tier = Some(model))
            }
        };
        info!(model = %kind, generation, "Installed model weights");
        Ok(generation)
    }

    /// Unload one model, returning its predictor to the fallback path
    pub fn clear(&self, kind: ModelKind) -> u64 {
        self.swap(|s| match kind {
            ModelKind::Confidence => s.confidence = None,
            ModelKind::FlowAnomaly => s.flow_anomaly = None,
            ModelKind::IvForecast => s.iv_forecast = None,
            ModelKind::MtfWeights => s.mtf_weights = None,
            ModelKind::SetupTier => s.setup_tier = None,
        })
    }

    /// Fetch every model kind from `source`, installing what validates
    ///
    /// Missing or malformed blobs are logged and skipped. Returns how many
    /// models were installed.
    pub async fn load_from(&self, source: &dyn WeightsSource) -> usize {
        let mut installed = 0;
        for kind in ModelKind::ALL {
            match source.fetch(kind).await {
                Ok(Some(json)) => match self.install(kind, &json) {
                    Ok(_) => installed += 1,
                    Err(e) => {
                        warn!(model = %kind, source = source.source_name(), error = %e, "Rejected model weights")
                    }
                },
                Ok(None) => {
                    info!(model = %kind, source = source.source_name(), "No weights published")
                }
                Err(e) => {
                    warn!(model = %kind, source = source.source_name(), error = %e, "Failed to fetch model weights")
                }
            }
        }
        installed
    }
}
