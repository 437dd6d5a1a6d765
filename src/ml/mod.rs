//! ML inference layer
//!
//! Five independently versioned models share one [`ModelRegistry`]. Each is
//! gated by its own [`RolloutPolicy`]; when a model is off for a user or not
//! loaded, its rule-based fallback answers instead.

pub mod anomaly;
pub mod confidence;
pub mod features;
pub mod iv_forecast;
pub mod linalg;
pub mod mtf;
pub mod registry;
pub mod rollout;
pub mod tier;
pub mod weights;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::types::{OptionContract, Setup};
use crate::config::types::MlConfig;
use anomaly::{detect_flow_anomaly, FlowAnomalyCandidate};
use features::FeatureVector;
use iv_forecast::{forecast_iv, IvFeatures, IvForecast};
use mtf::{timeframe_weights, MtfInput, MtfWeighting};
use registry::ModelRegistry;
use rollout::{is_enabled_for_user, BucketHasher, Fnv1aHasher, RolloutPolicy};
use tier::{assess_tier, TierAssessment};

pub use registry::{ModelError, ModelKind, ModelSnapshot};
pub use weights::DirectoryWeightsSource;

/// Where a score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceSource {
    Ml,
    Fallback,
    RuleBased,
}

/// Rollout policy per model kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RolloutPolicies {
    pub confidence: RolloutPolicy,
    pub flow_anomaly: RolloutPolicy,
    pub iv_forecast: RolloutPolicy,
    pub mtf_weights: RolloutPolicy,
    pub setup_tier: RolloutPolicy,
}

impl RolloutPolicies {
    pub fn get(&self, kind: ModelKind) -> &RolloutPolicy {
        match kind {
            ModelKind::Confidence => &self.confidence,
            ModelKind::FlowAnomaly => &self.flow_anomaly,
            ModelKind::IvForecast => &self.iv_forecast,
            ModelKind::MtfWeights => &self.mtf_weights,
            ModelKind::SetupTier => &self.setup_tier,
        }
    }
}

impl From<&MlConfig> for RolloutPolicies {
    fn from(config: &MlConfig) -> Self {
        Self {
            confidence: config.confidence,
            flow_anomaly: config.flow_anomaly,
            iv_forecast: config.iv_forecast,
            mtf_weights: config.mtf_weights,
            setup_tier: config.setup_tier,
        }
    }
}

/// Rollout-aware front door to the models
///
/// Every call takes one registry snapshot, so a concurrent swap never mixes
/// two model generations inside a single prediction.
pub struct MlLayer {
    registry: Arc<ModelRegistry>,
    policies: RolloutPolicies,
    hasher: Box<dyn BucketHasher>,
}

impl std::fmt::Debug for MlLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlLayer")
            .field("generation", &self.registry.snapshot().generation)
            .field("policies", &self.policies)
            .finish()
    }
}

impl MlLayer {
    pub fn new(registry: Arc<ModelRegistry>, policies: RolloutPolicies) -> Self {
        Self::with_hasher(registry, policies, Box::new(Fnv1aHasher))
    }

    pub fn with_hasher(
        registry: Arc<ModelRegistry>,
        policies: RolloutPolicies,
        hasher: Box<dyn BucketHasher>,
    ) -> Self {
        Self {
            registry,
            policies,
            hasher,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn is_enabled(&self, kind: ModelKind, user_id: Option<&str>) -> bool {
        is_enabled_for_user(self.policies.get(kind), user_id, self.hasher.as_ref())
    }

    /// Model confidence in percent; `None` when off or not loaded
    pub fn confidence(&self, features: &FeatureVector, user_id: Option<&str>) -> Option<f64> {
        if !self.is_enabled(ModelKind::Confidence, user_id) {
            return None;
        }
        let snapshot = self.registry.snapshot();
        snapshot.confidence.as_ref().map(|model| model.predict(features))
    }

    pub fn flow_anomaly(
        &self,
        chain: &[OptionContract],
        minute_of_session: u32,
        user_id: Option<&str>,
    ) -> Option<FlowAnomalyCandidate> {
        let snapshot = self.registry.snapshot();
        let forest = if self.is_enabled(ModelKind::FlowAnomaly, user_id) {
            snapshot.flow_anomaly.as_deref()
        } else {
            None
        };
        detect_flow_anomaly(chain, minute_of_session, forest)
    }

    pub fn iv_forecast(
        &self,
        current_iv: Option<f64>,
        features: &IvFeatures,
        user_id: Option<&str>,
    ) -> IvForecast {
        let snapshot = self.registry.snapshot();
        let model = if self.is_enabled(ModelKind::IvForecast, user_id) {
            snapshot.iv_forecast.as_deref()
        } else {
            None
        };
        forecast_iv(current_iv, features, model)
    }

    pub fn timeframe_weights(&self, input: &MtfInput, user_id: Option<&str>) -> MtfWeighting {
        let snapshot = self.registry.snapshot();
        let model = if self.is_enabled(ModelKind::MtfWeights, user_id) {
            snapshot.mtf_weights.as_deref()
        } else {
            None
        };
        timeframe_weights(input, model)
    }

    /// Display tier for a scored setup
    ///
    /// Falls back to the confidence and confluence ladder when the tier
    /// model is off for the user or not loaded.
    pub fn setup_tier(
        &self,
        features: &FeatureVector,
        setup: &Setup,
        confidence: f64,
        user_id: Option<&str>,
    ) -> TierAssessment {
        let snapshot = self.registry.snapshot();
        let model = if self.is_enabled(ModelKind::SetupTier, user_id) {
            snapshot.setup_tier.as_deref()
        } else {
            None
        };
        assess_tier(features, setup, confidence, model)
    }
}
