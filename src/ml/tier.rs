//! Setup tier classifier
//!
//! One linear score per tier over the normalized feature vector, softmaxed
//! into tier probabilities. The winning tier is then held to the setup
//! type's probability thresholds and demoted when it falls short.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::features::{FeatureVector, FEATURE_COUNT};
use super::linalg::{dot, round_to, softmax};
use super::registry::ModelError;
use super::InferenceSource;
use crate::common::types::{Setup, SetupTier, SetupType};

const MODEL_NAME: &str = "setup_tier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlTier {
    SniperPrimary,
    SniperSecondary,
    Watchlist,
    Skip,
}

impl MlTier {
    pub const ALL: [MlTier; 4] = [
        MlTier::SniperPrimary,
        MlTier::SniperSecondary,
        MlTier::Watchlist,
        MlTier::Skip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MlTier::SniperPrimary => "sniper_primary",
            MlTier::SniperSecondary => "sniper_secondary",
            MlTier::Watchlist => "watchlist",
            MlTier::Skip => "skip",
        }
    }

    fn index(self) -> usize {
        match self {
            MlTier::SniperPrimary => 0,
            MlTier::SniperSecondary => 1,
            MlTier::Watchlist => 2,
            MlTier::Skip => 3,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.as_str() == name)
    }

    /// Skipped setups are hidden from display
    pub fn setup_tier(self) -> SetupTier {
        match self {
            MlTier::SniperPrimary => SetupTier::SniperPrimary,
            MlTier::SniperSecondary => SetupTier::SniperSecondary,
            MlTier::Watchlist => SetupTier::Watchlist,
            MlTier::Skip => SetupTier::Hidden,
        }
    }

    pub fn from_setup_tier(tier: SetupTier) -> Option<Self> {
        match tier {
            SetupTier::SniperPrimary => Some(MlTier::SniperPrimary),
            SetupTier::SniperSecondary => Some(MlTier::SniperSecondary),
            SetupTier::Watchlist => Some(MlTier::Watchlist),
            SetupTier::Hidden => None,
        }
    }
}

impl std::fmt::Display for MlTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum winning probability per tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierThresholds {
    pub sniper_primary: f64,
    pub sniper_secondary: f64,
    pub watchlist: f64,
}

impl TierThresholds {
    const fn new(sniper_primary: f64, sniper_secondary: f64, watchlist: f64) -> Self {
        Self {
            sniper_primary,
            sniper_secondary,
            watchlist,
        }
    }

    fn is_valid(&self) -> bool {
        [self.sniper_primary, self.sniper_secondary, self.watchlist]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// Stock thresholds for each setup family
pub fn tier_thresholds(setup_type: SetupType) -> TierThresholds {
    match setup_type {
        SetupType::FadeAtWall => TierThresholds::new(0.8, 0.69, 0.56),
        SetupType::BreakoutVacuum => TierThresholds::new(0.73, 0.6, 0.48),
        SetupType::MeanReversion => TierThresholds::new(0.75, 0.64, 0.5),
        SetupType::TrendContinuation => TierThresholds::new(0.74, 0.62, 0.49),
        SetupType::OrbBreakout => TierThresholds::new(0.72, 0.6, 0.47),
        SetupType::TrendPullback => TierThresholds::new(0.76, 0.64, 0.51),
        SetupType::FlipReclaim => TierThresholds::new(0.75, 0.63, 0.5),
        SetupType::VwapReclaim => TierThresholds::new(0.73, 0.61, 0.48),
        SetupType::VwapFadeAtBand => TierThresholds::new(0.78, 0.66, 0.53),
    }
}

/// Demote a winning tier whose probability misses its threshold
pub fn gate_tier(winner: MlTier, probability: f64, thresholds: &TierThresholds) -> MlTier {
    if probability < thresholds.watchlist {
        return MlTier::Skip;
    }
    match winner {
        MlTier::SniperPrimary if probability < thresholds.sniper_primary => {
            if probability >= thresholds.sniper_secondary {
                MlTier::SniperSecondary
            } else {
                MlTier::Watchlist
            }
        }
        MlTier::SniperSecondary if probability < thresholds.sniper_secondary => MlTier::Watchlist,
        other => other,
    }
}

/// Tier from decision confidence and confluence when no model answers
///
/// A visible tier already set by the detector is kept as is.
pub fn rule_based_tier(setup: &Setup, confidence: f64) -> MlTier {
    if let Some(existing) = setup.tier.and_then(MlTier::from_setup_tier) {
        return existing;
    }
    let confluence = setup.confluence_score;
    if confidence >= 78.0 && confluence >= 4.0 {
        MlTier::SniperPrimary
    } else if confidence >= 72.0 && confluence >= 3.5 {
        MlTier::SniperSecondary
    } else if confidence >= 60.0 && confluence >= 3.0 {
        MlTier::Watchlist
    } else {
        MlTier::Skip
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TierWeightsWire {
    version: String,
    intercept_by_tier: BTreeMap<String, f64>,
    feature_weights_by_tier: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    thresholds_by_setup_type: BTreeMap<String, TierThresholds>,
}

fn invalid(detail: String) -> ModelError {
    ModelError::Invalid {
        model: MODEL_NAME.to_string(),
        detail,
    }
}

fn parse_tier(name: &str) -> Result<MlTier, ModelError> {
    MlTier::parse(name).ok_or_else(|| invalid(format!("unknown tier {name}")))
}

/// Validated per-tier intercepts and weights
#[derive(Debug, Clone, PartialEq)]
pub struct TierModel {
    version: String,
    intercepts: [f64; 4],
    weights: [[f64; FEATURE_COUNT]; 4],
    thresholds: HashMap<SetupType, TierThresholds>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPrediction {
    /// Tier after threshold gating
    pub tier: MlTier,
    /// Tier with the highest probability before gating
    pub winner: MlTier,
    pub probability: f64,
}

impl TierModel {
    /// Parse `{version, interceptByTier, featureWeightsByTier, thresholdsBySetupType?}`
    ///
    /// Every tier needs an intercept. Tiers without weights score on their
    /// intercept alone; unknown tiers, features and setup types are rejected.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let wire: TierWeightsWire = serde_json::from_str(json)?;

        let mut intercepts = [f64::NAN; 4];
        for (name, value) in &wire.intercept_by_tier {
            if !value.is_finite() {
                return Err(invalid(format!("intercept for {name} is not finite")));
            }
            intercepts[parse_tier(name)?.index()] = *value;
        }
        if let Some(missing) = MlTier::ALL.into_iter().find(|t| intercepts[t.index()].is_nan()) {
            return Err(invalid(format!("no intercept for {missing}")));
        }

        let mut weights = [[0.0; FEATURE_COUNT]; 4];
        for (name, features) in &wire.feature_weights_by_tier {
            let row = &mut weights[parse_tier(name)?.index()];
            for (feature, weight) in features {
                let idx = FeatureVector::index_of(feature).ok_or_else(|| ModelError::UnknownFeature {
                    model: MODEL_NAME.to_string(),
                    feature: feature.clone(),
                })?;
                if !weight.is_finite() {
                    return Err(invalid(format!("{name} weight for {feature} is not finite")));
                }
                row[idx] = *weight;
            }
        }

        let mut thresholds = HashMap::new();
        for (name, value) in wire.thresholds_by_setup_type {
            let setup_type: SetupType = serde_json::from_value(serde_json::Value::String(name.clone()))
                .map_err(|_| invalid(format!("unknown setup type {name}")))?;
            if !value.is_valid() {
                return Err(invalid(format!("thresholds for {name} are outside [0, 1]")));
            }
            thresholds.insert(setup_type, value);
        }

        Ok(Self {
            version: wire.version,
            intercepts,
            weights,
            thresholds,
        })
    }

    /// The stock `tier-default-v1` weights
    pub fn builtin() -> Result<Self, ModelError> {
        Self::from_json(
            r#"{
                "version": "tier-default-v1",
                "interceptByTier": {
                    "sniper_primary": -0.4,
                    "sniper_secondary": -0.2,
                    "watchlist": 0.05,
                    "skip": 0.0
                },
                "featureWeightsByTier": {
                    "sniper_primary": {
                        "confluenceScore": 0.45,
                        "regimeCompatibility": 0.3,
                        "flowBias": 0.22,
                        "historicalWinRate": 0.28,
                        "confluenceEmaAlignment": 0.12
                    },
                    "sniper_secondary": {
                        "confluenceScore": 0.34,
                        "regimeCompatibility": 0.2,
                        "flowBias": 0.16,
                        "historicalWinRate": 0.16,
                        "confluenceEmaAlignment": 0.08
                    },
                    "watchlist": {
                        "confluenceScore": 0.22,
                        "regimeCompatibility": 0.12,
                        "flowBias": 0.08,
                        "historicalWinRate": 0.1
                    },
                    "skip": {
                        "confluenceScore": -0.2,
                        "regimeCompatibility": -0.16,
                        "flowBias": -0.08,
                        "historicalWinRate": -0.1,
                        "distanceToVWAP": 0.08
                    }
                }
            }"#,
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Model thresholds for the setup type, else the stock table
    pub fn thresholds(&self, setup_type: SetupType) -> TierThresholds {
        self.thresholds
            .get(&setup_type)
            .copied()
            .unwrap_or_else(|| tier_thresholds(setup_type))
    }

    pub fn predict(&self, features: &FeatureVector, setup_type: SetupType) -> TierPrediction {
        let x = features.normalized();
        let scores: Vec<f64> = MlTier::ALL
            .iter()
            .map(|tier| self.intercepts[tier.index()] + dot(&self.weights[tier.index()], &x))
            .collect();
        let probabilities = softmax(&scores);

        // first tier wins a tie
        let (best, probability) = probabilities
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best, top), (idx, &p)| {
                if p > top {
                    (idx, p)
                } else {
                    (best, top)
                }
            });
        let winner = MlTier::ALL[best];

        TierPrediction {
            tier: gate_tier(winner, probability, &self.thresholds(setup_type)),
            winner,
            probability: round_to(probability, 4),
        }
    }
}

/// Tier decision with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAssessment {
    pub tier: MlTier,
    /// Winning probability; only the model reports one
    pub probability: Option<f64>,
    pub source: InferenceSource,
}

/// Model tier when one is available, else the rule-based tier
pub fn assess_tier(
    features: &FeatureVector,
    setup: &Setup,
    confidence: f64,
    model: Option<&TierModel>,
) -> TierAssessment {
    match model {
        Some(model) => {
            let prediction = model.predict(features, setup.setup_type);
            TierAssessment {
                tier: prediction.tier,
                probability: Some(prediction.probability),
                source: InferenceSource::Ml,
            }
        }
        None => TierAssessment {
            tier: rule_based_tier(setup, confidence),
            probability: None,
            source: InferenceSource::RuleBased,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Direction, SetupStatus};
    use crate::setup::fixtures::sample_setup;

    const CONFIDENT_JSON: &str = r#"{
        "version": "tier-test",
        "interceptByTier": { "sniper_primary": 4.0, "sniper_secondary": 0.0, "watchlist": 0.0, "skip": 0.0 },
        "featureWeightsByTier": { "sniper_primary": { "confluenceScore": 1.0 } }
    }"#;

    #[test]
    fn test_gate_demotes_short_winners() {
        let fade = tier_thresholds(SetupType::FadeAtWall);
        assert_eq!(gate_tier(MlTier::SniperPrimary, 0.85, &fade), MlTier::SniperPrimary);
        assert_eq!(gate_tier(MlTier::SniperPrimary, 0.7, &fade), MlTier::SniperSecondary);
        assert_eq!(gate_tier(MlTier::SniperPrimary, 0.6, &fade), MlTier::Watchlist);
        assert_eq!(gate_tier(MlTier::SniperSecondary, 0.6, &fade), MlTier::Watchlist);
        assert_eq!(gate_tier(MlTier::Watchlist, 0.55, &fade), MlTier::Skip);
    }

    #[test]
    fn test_rule_based_ladder() {
        let mut setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        setup.confluence_score = 4.0;
        assert_eq!(rule_based_tier(&setup, 80.0), MlTier::SniperPrimary);
        assert_eq!(rule_based_tier(&setup, 74.0), MlTier::SniperSecondary);
        assert_eq!(rule_based_tier(&setup, 61.0), MlTier::Watchlist);
        assert_eq!(rule_based_tier(&setup, 40.0), MlTier::Skip);
    }

    #[test]
    fn test_detector_tier_is_kept_unless_hidden() {
        let mut setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        setup.tier = Some(SetupTier::SniperSecondary);
        assert_eq!(rule_based_tier(&setup, 10.0), MlTier::SniperSecondary);

        setup.tier = Some(SetupTier::Hidden);
        assert_eq!(rule_based_tier(&setup, 10.0), MlTier::Skip);
    }

    #[test]
    fn test_builtin_skips_weak_setups() {
        let model = TierModel::builtin().unwrap();
        let prediction = model.predict(&FeatureVector::default(), SetupType::FadeAtWall);
        assert!(prediction.probability < 0.56);
        assert_eq!(prediction.tier, MlTier::Skip);
    }

    #[test]
    fn test_confident_model_picks_sniper_primary() {
        let model = TierModel::from_json(CONFIDENT_JSON).unwrap();
        let features = FeatureVector {
            confluence_score: 5.0,
            ..Default::default()
        };
        let prediction = model.predict(&features, SetupType::FadeAtWall);
        assert_eq!(prediction.winner, MlTier::SniperPrimary);
        assert!(prediction.probability > 0.9);
        assert_eq!(prediction.tier, MlTier::SniperPrimary);
    }

    #[test]
    fn test_model_thresholds_override_stock_table() {
        let json = r#"{
            "version": "tier-strict",
            "interceptByTier": { "sniper_primary": 4.0, "sniper_secondary": 0.0, "watchlist": 0.0, "skip": 0.0 },
            "featureWeightsByTier": {},
            "thresholdsBySetupType": {
                "fade_at_wall": { "sniperPrimary": 0.99, "sniperSecondary": 0.9, "watchlist": 0.5 }
            }
        }"#;
        let model = TierModel::from_json(json).unwrap();
        let prediction = model.predict(&FeatureVector::default(), SetupType::FadeAtWall);
        // exp(4) / (exp(4) + 3) is about 0.948
        assert_eq!(prediction.tier, MlTier::SniperSecondary);
        assert_eq!(
            model.predict(&FeatureVector::default(), SetupType::OrbBreakout).tier,
            MlTier::SniperPrimary
        );
    }

    #[test]
    fn test_bad_blobs_are_rejected() {
        let missing_intercept = r#"{
            "version": "v",
            "interceptByTier": { "sniper_primary": 0.0 },
            "featureWeightsByTier": {}
        }"#;
        assert!(matches!(
            TierModel::from_json(missing_intercept),
            Err(ModelError::Invalid { .. })
        ));

        let unknown_feature = CONFIDENT_JSON.replace("confluenceScore", "moonPhase");
        assert!(matches!(
            TierModel::from_json(&unknown_feature),
            Err(ModelError::UnknownFeature { .. })
        ));

        let unknown_type = r#"{
            "version": "v",
            "interceptByTier": { "sniper_primary": 0.0, "sniper_secondary": 0.0, "watchlist": 0.0, "skip": 0.0 },
            "featureWeightsByTier": {},
            "thresholdsBySetupType": { "coin_flip": { "sniperPrimary": 0.9, "sniperSecondary": 0.8, "watchlist": 0.5 } }
        }"#;
        assert!(matches!(TierModel::from_json(unknown_type), Err(ModelError::Invalid { .. })));
    }

    #[test]
    fn test_assess_tier_reports_source() {
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let fallback = assess_tier(&FeatureVector::default(), &setup, 65.0, None);
        assert_eq!(fallback.tier, MlTier::Watchlist);
        assert_eq!(fallback.source, InferenceSource::RuleBased);
        assert_eq!(fallback.probability, None);

        let model = TierModel::builtin().unwrap();
        let scored = assess_tier(&FeatureVector::default(), &setup, 65.0, Some(&model));
        assert_eq!(scored.source, InferenceSource::Ml);
        assert!(scored.probability.is_some());
    }
}
