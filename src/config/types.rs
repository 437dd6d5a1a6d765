//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::ml::rollout::RolloutPolicy;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feed trust thresholds
    #[serde(default)]
    pub trust: TrustConfig,
    /// Model rollout and weight loading
    #[serde(default)]
    pub ml: MlConfig,
    /// Entry gate thresholds
    #[serde(default)]
    pub gates: GateConfig,
    /// Contract selection limits
    #[serde(default)]
    pub contract: ContractConfig,
    /// Coach timeline behavior
    #[serde(default)]
    pub coach: CoachConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Sequence and heartbeat thresholds for the trust orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Milliseconds without any event before the heartbeat is stale
    #[serde(default = "default_heartbeat_stale_ms")]
    pub heartbeat_stale_ms: i64,
    /// Extra sequence numbers allowed to be skipped before a gap is flagged
    #[serde(default)]
    pub sequence_gap_tolerance: u64,
    /// Tick source staleness threshold for feed health
    #[serde(default = "default_tick_stale_ms")]
    pub tick_stale_ms: i64,
    /// Poll source staleness threshold for feed health
    #[serde(default = "default_poll_stale_ms")]
    pub poll_stale_ms: i64,
    /// Snapshot source staleness threshold for feed health
    #[serde(default = "default_snapshot_stale_ms")]
    pub snapshot_stale_ms: i64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            heartbeat_stale_ms: default_heartbeat_stale_ms(),
            sequence_gap_tolerance: 0,
            tick_stale_ms: default_tick_stale_ms(),
            poll_stale_ms: default_poll_stale_ms(),
            snapshot_stale_ms: default_snapshot_stale_ms(),
        }
    }
}

fn default_heartbeat_stale_ms() -> i64 {
    15_000
}

fn default_tick_stale_ms() -> i64 {
    7_500
}

fn default_poll_stale_ms() -> i64 {
    90_000
}

fn default_snapshot_stale_ms() -> i64 {
    300_000
}

/// Per-model rollout policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    #[serde(default)]
    pub confidence: RolloutPolicy,
    #[serde(default)]
    pub flow_anomaly: RolloutPolicy,
    #[serde(default)]
    pub iv_forecast: RolloutPolicy,
    #[serde(default)]
    pub mtf_weights: RolloutPolicy,
    #[serde(default)]
    pub setup_tier: RolloutPolicy,
    /// Directory holding `<model>.json` weight blobs
    #[serde(default)]
    pub weights_dir: Option<String>,
    /// Install the bundled anomaly forest, IV cell and tier weights at startup
    #[serde(default = "default_true")]
    pub builtin_models: bool,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            confidence: RolloutPolicy::default(),
            flow_anomaly: RolloutPolicy::default(),
            iv_forecast: RolloutPolicy::default(),
            mtf_weights: RolloutPolicy::default(),
            setup_tier: RolloutPolicy::default(),
            weights_dir: None,
            builtin_models: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Risk envelope thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum multi-timeframe alignment (0-100)
    #[serde(default = "default_min_alignment")]
    pub min_alignment: f64,
    /// Minimum decision confidence (0-100)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_alignment: default_min_alignment(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_min_alignment() -> f64 {
    55.0
}

fn default_min_confidence() -> f64 {
    60.0
}

/// Liquidity limits for contract selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default = "default_min_open_interest")]
    pub min_open_interest: u64,
    #[serde(default = "default_min_volume")]
    pub min_volume: u64,
    /// Maximum (ask - bid) / mid
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: f64,
    /// Shares per contract
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Per-contract debit cap for the strict delta band
    #[serde(default = "default_max_risk_strict")]
    pub max_contract_risk_strict: Decimal,
    /// Per-contract debit cap for the relaxed delta band
    #[serde(default = "default_max_risk_relaxed")]
    pub max_contract_risk_relaxed: Decimal,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            min_open_interest: default_min_open_interest(),
            min_volume: default_min_volume(),
            max_spread_pct: default_max_spread_pct(),
            multiplier: default_multiplier(),
            max_contract_risk_strict: default_max_risk_strict(),
            max_contract_risk_relaxed: default_max_risk_relaxed(),
        }
    }
}

fn default_min_open_interest() -> u64 {
    150
}

fn default_min_volume() -> u64 {
    20
}

fn default_max_spread_pct() -> f64 {
    0.24
}

fn default_multiplier() -> u32 {
    100
}

fn default_max_risk_strict() -> Decimal {
    dec!(2500)
}

fn default_max_risk_relaxed() -> Decimal {
    dec!(3500)
}

/// Coach timeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachConfig {
    /// Window inside which identical narration is collapsed
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: i64,
    /// Messages retained per symbol timeline
    #[serde(default = "default_timeline_capacity")]
    pub timeline_capacity: usize,
    /// Enables trade-mode scoping of coach decisions
    #[serde(default = "default_true")]
    pub trade_mode_scoping: bool,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: default_dedupe_window_ms(),
            timeline_capacity: default_timeline_capacity(),
            trade_mode_scoping: true,
        }
    }
}

fn default_dedupe_window_ms() -> i64 {
    8 * 60 * 1000
}

fn default_timeline_capacity() -> usize {
    200
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Buffer size for per-symbol event channels
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// User id used for model rollout bucketing
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            channel_size: default_channel_size(),
            user_id: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_size() -> usize {
    crate::common::channels::DEFAULT_CHANNEL_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract_constants() {
        let config = AppConfig::default();
        assert_eq!(config.trust.heartbeat_stale_ms, 15_000);
        assert_eq!(config.trust.sequence_gap_tolerance, 0);
        assert_eq!(config.coach.dedupe_window_ms, 480_000);
        assert_eq!(config.contract.min_open_interest, 150);
        assert_eq!(config.contract.multiplier, 100);
        assert!(!config.ml.confidence.enabled);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"trust": {"sequence_gap_tolerance": 2}, "gates": {"min_confidence": 70}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.trust.sequence_gap_tolerance, 2);
        assert_eq!(config.trust.heartbeat_stale_ms, 15_000);
        assert_eq!(config.gates.min_confidence, 70.0);
        assert_eq!(config.gates.min_alignment, 55.0);
    }
}
