//! Flow anomaly detection with an isolation-tree ensemble
//!
//! Short average path lengths mean a print is easy to isolate, i.e. unusual.
//! The score is `2^(-mean_path / c(n))` where `c(n)` is the expected path
//! length for a sample of `n`.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::linalg::round_to;
use super::registry::ModelError;
use super::InferenceSource;
use crate::common::types::{Direction, OptionContract, OptionType};

const MODEL_NAME: &str = "flow_anomaly";
const EULER_GAMMA: f64 = 0.577_215_664_9;

pub const FLOW_ANOMALY_THRESHOLD: f64 = 0.62;
pub const DEFAULT_SAMPLE_SIZE: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnomalyFeature {
    VolumeOiZScore,
    PremiumMomentum,
    SpreadTighteningRatio,
    SweepIntensity,
    TimeOfDayNormalizedVolume,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyFeatures {
    pub volume_oi_z_score: f64,
    pub premium_momentum: f64,
    pub spread_tightening_ratio: f64,
    pub sweep_intensity: f64,
    pub time_of_day_normalized_volume: f64,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl AnomalyFeatures {
    fn get(&self, feature: AnomalyFeature) -> f64 {
        match feature {
            AnomalyFeature::VolumeOiZScore => self.volume_oi_z_score,
            AnomalyFeature::PremiumMomentum => self.premium_momentum,
            AnomalyFeature::SpreadTighteningRatio => self.spread_tightening_ratio,
            AnomalyFeature::SweepIntensity => self.sweep_intensity,
            AnomalyFeature::TimeOfDayNormalizedVolume => self.time_of_day_normalized_volume,
        }
    }

    /// Clamp into the ranges the trees were grown on
    pub fn normalized(&self) -> Self {
        Self {
            volume_oi_z_score: finite_or_zero(self.volume_oi_z_score).clamp(0.0, 12.0),
            premium_momentum: finite_or_zero(self.premium_momentum).clamp(0.0, 3.0),
            spread_tightening_ratio: finite_or_zero(self.spread_tightening_ratio).clamp(0.0, 1.0),
            sweep_intensity: finite_or_zero(self.sweep_intensity).clamp(0.0, 1.5),
            time_of_day_normalized_volume: finite_or_zero(self.time_of_day_normalized_volume)
                .clamp(0.0, 3.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IsolationNode {
    #[serde(rename_all = "camelCase")]
    Leaf { path_length: f64 },
    #[serde(rename_all = "camelCase")]
    Split {
        feature: AnomalyFeature,
        threshold: f64,
        high_branch: Branch,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
}

impl IsolationNode {
    fn leaf(path_length: f64) -> Self {
        IsolationNode::Leaf { path_length }
    }

    fn split(feature: AnomalyFeature, threshold: f64, left: Self, right: Self) -> Self {
        IsolationNode::Split {
            feature,
            threshold,
            high_branch: Branch::Left,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Values strictly above the threshold take the high branch
    fn path_length(&self, features: &AnomalyFeatures) -> f64 {
        let mut node = self;
        loop {
            match node {
                IsolationNode::Leaf { path_length } => return *path_length,
                IsolationNode::Split {
                    feature,
                    threshold,
                    high_branch,
                    left,
                    right,
                } => {
                    let high = features.get(*feature) > *threshold;
                    node = match (high, high_branch) {
                        (true, Branch::Left) | (false, Branch::Right) => left,
                        (true, Branch::Right) | (false, Branch::Left) => right,
                    };
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        match self {
            IsolationNode::Leaf { path_length } if path_length.is_finite() && *path_length >= 0.0 => Ok(()),
            IsolationNode::Leaf { .. } => Err(ModelError::Invalid {
                model: MODEL_NAME.to_string(),
                detail: "leaf path length must be finite and non-negative".to_string(),
            }),
            IsolationNode::Split {
                threshold,
                left,
                right,
                ..
            } => {
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid {
                        model: MODEL_NAME.to_string(),
                        detail: "split threshold is not finite".to_string(),
                    });
                }
                left.validate()?;
                right.validate()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForestWire {
    version: String,
    #[serde(default = "default_sample_size")]
    sample_size: u32,
    #[serde(default = "default_threshold")]
    threshold: f64,
    trees: Vec<IsolationNode>,
}

fn default_sample_size() -> u32 {
    DEFAULT_SAMPLE_SIZE
}

fn default_threshold() -> f64 {
    FLOW_ANOMALY_THRESHOLD
}

/// Expected isolation path length for a sample of `n`
pub fn average_path_length(sample_size: u32) -> f64 {
    match sample_size {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = f64::from(n);
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyScore {
    pub score: f64,
    pub average_path_length: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyForest {
    version: String,
    sample_size: u32,
    threshold: f64,
    trees: Vec<IsolationNode>,
}

impl AnomalyForest {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let wire: ForestWire = serde_json::from_str(json)?;
        if wire.trees.is_empty() {
            return Err(ModelError::Shape {
                model: MODEL_NAME.to_string(),
                detail: "forest has no trees".to_string(),
            });
        }
        if wire.sample_size < 2 {
            return Err(ModelError::Invalid {
                model: MODEL_NAME.to_string(),
                detail: format!("sample size {} is too small", wire.sample_size),
            });
        }
        if !(0.0..=1.0).contains(&wire.threshold) {
            return Err(ModelError::Invalid {
                model: MODEL_NAME.to_string(),
                detail: format!("threshold {} outside [0, 1]", wire.threshold),
            });
        }
        for tree in &wire.trees {
            tree.validate()?;
        }
        Ok(Self {
            version: wire.version,
            sample_size: wire.sample_size,
            threshold: wire.threshold,
            trees: wire.trees,
        })
    }

    /// Six hand-grown trees over the flow features
    pub fn builtin() -> Self {
        use AnomalyFeature::*;
        use IsolationNode as N;

        let trees = vec![
            N::split(
                VolumeOiZScore,
                2.1,
                N::leaf(2.0),
                N::split(PremiumMomentum, 0.8, N::leaf(4.0), N::leaf(8.0)),
            ),
            N::split(
                SweepIntensity,
                0.72,
                N::leaf(3.0),
                N::split(TimeOfDayNormalizedVolume, 1.15, N::leaf(5.0), N::leaf(8.0)),
            ),
            N::split(
                SpreadTighteningRatio,
                0.82,
                N::split(VolumeOiZScore, 1.3, N::leaf(4.0), N::leaf(7.0)),
                N::leaf(8.0),
            ),
            N::split(
                TimeOfDayNormalizedVolume,
                1.0,
                N::split(PremiumMomentum, 0.55, N::leaf(4.0), N::leaf(7.0)),
                N::leaf(8.0),
            ),
            N::split(
                PremiumMomentum,
                0.95,
                N::leaf(3.0),
                N::split(VolumeOiZScore, 1.6, N::leaf(5.0), N::leaf(8.0)),
            ),
            N::split(
                VolumeOiZScore,
                0.95,
                N::split(SweepIntensity, 0.6, N::leaf(4.0), N::leaf(7.0)),
                N::leaf(8.0),
            ),
        ];

        Self {
            version: "flow-iforest-v1".to_string(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            threshold: FLOW_ANOMALY_THRESHOLD,
            trees,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, features: &AnomalyFeatures) -> AnomalyScore {
        let normalized = features.normalized();
        let total: f64 = self.trees.iter().map(|t| t.path_length(&normalized)).sum();
        let mean = total / self.trees.len() as f64;
        let expected = average_path_length(self.sample_size).max(1e-9);
        let score = 2f64.powf(-mean / expected).clamp(0.0, 1.0);
        AnomalyScore {
            score,
            average_path_length: mean,
            is_anomaly: score >= self.threshold,
        }
    }
}

/// Bounded linear stand-in used when no forest is loaded
pub fn heuristic_anomaly_score(features: &AnomalyFeatures) -> f64 {
    let f = features.normalized();
    let raw = 0.30 * (f.volume_oi_z_score / 4.0).min(1.0)
        + 0.25 * (f.premium_momentum / 2.0).min(1.0)
        + 0.15 * f.spread_tightening_ratio
        + 0.15 * f.sweep_intensity.min(1.0)
        + 0.15 * (f.time_of_day_normalized_volume / 2.0).min(1.0);
    round_to(raw.clamp(0.0, 1.0), 4)
}

/// Higher baseline flow near the open and close
pub fn session_seasonality(minute_of_session: u32) -> f64 {
    if minute_of_session < 60 {
        1.5
    } else if minute_of_session > 300 {
        1.35
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowAnomalyCandidate {
    pub contract: OptionContract,
    pub direction: Direction,
    pub anomaly_score: f64,
    pub average_path_length: Option<f64>,
    pub features: AnomalyFeatures,
    pub volume_oi_ratio: f64,
    /// `Ml` when the forest scored the contract, `Fallback` for the heuristic
    pub source: InferenceSource,
}

fn safe_divide(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator == 0.0 {
        fallback
    } else {
        numerator / denominator
    }
}

fn contract_mid(contract: &OptionContract) -> f64 {
    contract.mid().to_f64().unwrap_or(0.0)
}

/// Features for one contract relative to the chain's baselines
fn contract_features(
    contract: &OptionContract,
    volume_baseline: f64,
    oi_baseline: f64,
    premium_baseline: f64,
    seasonality: f64,
) -> (AnomalyFeatures, f64) {
    let volume = contract.volume as f64;
    let spread_pct = contract.spread_pct().map_or(1.0, |p| p.clamp(0.0, 1.0));
    let volume_oi_ratio = safe_divide(volume, contract.open_interest as f64, 0.0);
    let baseline_ratio = safe_divide(volume_baseline, oi_baseline, 1.0);
    let relative_z = safe_divide(
        volume_oi_ratio - baseline_ratio,
        (baseline_ratio * 0.5).max(0.5),
        0.0,
    );
    let premium = contract_mid(contract) * volume;

    let features = AnomalyFeatures {
        volume_oi_z_score: relative_z.max((volume_oi_ratio - 1.0).max(0.0)),
        premium_momentum: (safe_divide(premium, premium_baseline, 0.0) - 1.0).clamp(0.0, 2.0),
        spread_tightening_ratio: (1.0 - spread_pct).clamp(0.0, 1.0),
        sweep_intensity: (volume_oi_ratio / 6.0).clamp(0.0, 1.0),
        time_of_day_normalized_volume: safe_divide(volume, volume_baseline * seasonality, 0.0)
            .clamp(0.0, 2.0),
    };
    (features, volume_oi_ratio)
}

/// Most anomalous contract in a chain, if it clears the threshold
///
/// Contracts without open interest or volume are ignored. With no forest the
/// heuristic score is used against the default threshold.
pub fn detect_flow_anomaly(
    chain: &[OptionContract],
    minute_of_session: u32,
    forest: Option<&AnomalyForest>,
) -> Option<FlowAnomalyCandidate> {
    let active: Vec<&OptionContract> = chain
        .iter()
        .filter(|c| c.open_interest > 0 && c.volume > 0)
        .collect();
    if active.is_empty() {
        return None;
    }

    let n = active.len() as f64;
    let volume_baseline = (active.iter().map(|c| c.volume as f64).sum::<f64>() / n).max(1.0);
    let oi_baseline = (active.iter().map(|c| c.open_interest as f64).sum::<f64>() / n).max(1.0);
    let premium_baseline = (active
        .iter()
        .map(|c| contract_mid(c) * c.volume as f64)
        .sum::<f64>()
        / n)
        .max(1.0);
    let seasonality = session_seasonality(minute_of_session);
    let threshold = forest.map_or(FLOW_ANOMALY_THRESHOLD, AnomalyForest::threshold);

    active
        .into_iter()
        .map(|contract| {
            let (features, volume_oi_ratio) = contract_features(
                contract,
                volume_baseline,
                oi_baseline,
                premium_baseline,
                seasonality,
            );
            let (anomaly_score, average_path_length, source) = match forest {
                Some(forest) => {
                    let scored = forest.score(&features);
                    (scored.score, Some(scored.average_path_length), InferenceSource::Ml)
                }
                None => (heuristic_anomaly_score(&features), None, InferenceSource::Fallback),
            };
            FlowAnomalyCandidate {
                contract: contract.clone(),
                direction: match contract.option_type {
                    OptionType::Call => Direction::Bullish,
                    OptionType::Put => Direction::Bearish,
                },
                anomaly_score,
                average_path_length,
                features,
                volume_oi_ratio,
                source,
            }
        })
        .max_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score))
        .filter(|top| top.anomaly_score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn contract(option_type: OptionType, volume: u64, open_interest: u64) -> OptionContract {
        OptionContract {
            strike: dec!(5000),
            expiry: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            option_type,
            bid: dec!(9.8),
            ask: dec!(10.0),
            delta: 0.3,
            gamma: 0.01,
            theta: -0.5,
            vega: 0.2,
            implied_volatility: 0.18,
            open_interest,
            volume,
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c = average_path_length(128);
        assert!((c - 8.8).abs() < 0.1, "c(128) = {c}");
    }

    #[test]
    fn test_extreme_features_score_high() {
        let forest = AnomalyForest::builtin();
        let hot = AnomalyFeatures {
            volume_oi_z_score: 6.0,
            premium_momentum: 2.0,
            spread_tightening_ratio: 0.95,
            sweep_intensity: 1.0,
            time_of_day_normalized_volume: 2.0,
        };
        let quiet = AnomalyFeatures::default();

        let hot_score = forest.score(&hot);
        let quiet_score = forest.score(&quiet);
        assert!(hot_score.is_anomaly);
        assert!(!quiet_score.is_anomaly);
        assert!(hot_score.average_path_length < quiet_score.average_path_length);
    }

    #[test]
    fn test_forest_round_trips_through_json() {
        let json = r#"{
            "version": "custom",
            "trees": [
                {"feature": "sweepIntensity", "threshold": 0.5, "highBranch": "right",
                 "left": {"pathLength": 8}, "right": {"pathLength": 1}}
            ]
        }"#;
        let forest = AnomalyForest::from_json(json).unwrap();
        let high = AnomalyFeatures {
            sweep_intensity: 0.9,
            ..Default::default()
        };
        assert_eq!(forest.score(&high).average_path_length, 1.0);
        assert_eq!(forest.score(&AnomalyFeatures::default()).average_path_length, 8.0);
    }

    #[test]
    fn test_empty_forest_is_rejected() {
        let err = AnomalyForest::from_json(r#"{"version": "x", "trees": []}"#).unwrap_err();
        assert!(matches!(err, ModelError::Shape { .. }));
    }

    #[test]
    fn test_heuristic_is_bounded() {
        let maxed = AnomalyFeatures {
            volume_oi_z_score: 100.0,
            premium_momentum: 100.0,
            spread_tightening_ratio: 100.0,
            sweep_intensity: 100.0,
            time_of_day_normalized_volume: 100.0,
        };
        assert_eq!(heuristic_anomaly_score(&maxed), 1.0);
        assert_eq!(heuristic_anomaly_score(&AnomalyFeatures::default()), 0.0);
    }

    #[test]
    fn test_detects_outsized_put_print() {
        let mut chain: Vec<OptionContract> = (0..8)
            .map(|_| contract(OptionType::Call, 50, 1_000))
            .collect();
        chain.push(contract(OptionType::Put, 6_000, 500));
        chain.push(contract(OptionType::Call, 0, 100));

        let forest = AnomalyForest::builtin();
        let candidate = detect_flow_anomaly(&chain, 120, Some(&forest)).unwrap();
        assert_eq!(candidate.direction, Direction::Bearish);
        assert_eq!(candidate.volume_oi_ratio, 12.0);
        assert_eq!(candidate.source, InferenceSource::Ml);
        assert!(candidate.average_path_length.is_some());

        let heuristic = detect_flow_anomaly(&chain, 120, None).unwrap();
        assert_eq!(heuristic.direction, Direction::Bearish);
        assert_eq!(heuristic.source, InferenceSource::Fallback);
        assert_eq!(heuristic.average_path_length, None);
    }

    #[test]
    fn test_quiet_chain_has_no_anomaly() {
        let chain: Vec<OptionContract> = (0..5)
            .map(|_| contract(OptionType::Call, 50, 1_000))
            .collect();
        assert!(detect_flow_anomaly(&chain, 120, Some(&AnomalyForest::builtin())).is_none());
        assert!(detect_flow_anomaly(&[], 120, None).is_none());
    }
}
