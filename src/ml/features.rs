//! Fixed-shape feature vector shared by the setup models

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::linalg::round_to;
use crate::common::types::{FlowEventType, Regime, Setup};
use crate::levels::confluence::{SOURCE_GEX_ALIGNMENT, SOURCE_REGIME_ALIGNMENT};
use crate::levels::regime::regime_compatibility;
use crate::market::context::MarketContext;

pub const FEATURE_COUNT: usize = 25;

/// Flow prints weighed by the decayed bias
const FLOW_BIAS_WINDOW: usize = 24;
const FLOW_BIAS_DECAY: f64 = 0.85;
/// Flow age reported when there is no flow at all
const NO_FLOW_AGE_MINUTES: f64 = 9_999.0;
const SESSION_LENGTH_MINUTES: f64 = 390.0;

/// Wire names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "confluenceScore",
    "confluenceFlowAge",
    "confluenceEmaAlignment",
    "confluenceGexAlignment",
    "regimeType",
    "regimeCompatibility",
    "regimeAge",
    "flowBias",
    "flowRecency",
    "flowVolume",
    "flowSweepCount",
    "distanceToVWAP",
    "distanceToNearestCluster",
    "atr14",
    "atr7_14_ratio",
    "ivRank",
    "ivSkew",
    "putCallRatio",
    "netGex",
    "minutesIntoSession",
    "dayOfWeek",
    "dte",
    "historicalWinRate",
    "historicalTestCount",
    "lastTestResult",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub confluence_score: f64,
    pub confluence_flow_age: f64,
    pub confluence_ema_alignment: f64,
    pub confluence_gex_alignment: f64,
    pub regime_type: f64,
    pub regime_compatibility: f64,
    pub regime_age: f64,
    pub flow_bias: f64,
    pub flow_recency: f64,
    pub flow_volume: f64,
    pub flow_sweep_count: f64,
    #[serde(rename = "distanceToVWAP")]
    pub distance_to_vwap: f64,
    pub distance_to_nearest_cluster: f64,
    pub atr14: f64,
    #[serde(rename = "atr7_14_ratio")]
    pub atr7_14_ratio: f64,
    pub iv_rank: f64,
    pub iv_skew: f64,
    pub put_call_ratio: f64,
    pub net_gex: f64,
    pub minutes_into_session: f64,
    pub day_of_week: f64,
    pub dte: f64,
    pub historical_win_rate: f64,
    pub historical_test_count: f64,
    pub last_test_result: f64,
}

impl FeatureVector {
    pub fn index_of(name: &str) -> Option<usize> {
        FEATURE_NAMES.iter().position(|n| *n == name)
    }

    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.confluence_score,
            self.confluence_flow_age,
            self.confluence_ema_alignment,
            self.confluence_gex_alignment,
            self.regime_type,
            self.regime_compatibility,
            self.regime_age,
            self.flow_bias,
            self.flow_recency,
            self.flow_volume,
            self.flow_sweep_count,
            self.distance_to_vwap,
            self.distance_to_nearest_cluster,
            self.atr14,
            self.atr7_14_ratio,
            self.iv_rank,
            self.iv_skew,
            self.put_call_ratio,
            self.net_gex,
            self.minutes_into_session,
            self.day_of_week,
            self.dte,
            self.historical_win_rate,
            self.historical_test_count,
            self.last_test_result,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        Self::index_of(name).map(|idx| self.as_array()[idx])
    }

    /// Scale every feature into a bounded range for the linear model
    pub fn normalized(&self) -> [f64; FEATURE_COUNT] {
        let mut out = self.as_array();
        for (idx, value) in out.iter_mut().enumerate() {
            *value = match FEATURE_NAMES[idx] {
                "confluenceScore" => (*value / 5.0).clamp(0.0, 1.0),
                "regimeCompatibility" | "historicalWinRate" => value.clamp(0.0, 1.0),
                "flowBias" => ((*value + 1.0) / 2.0).clamp(0.0, 1.0),
                "distanceToVWAP" => (*value / 10.0).clamp(-1.0, 1.0),
                _ => value.clamp(-1.0, 1.0),
            };
        }
        out
    }
}

fn regime_code(regime: Option<Regime>) -> f64 {
    match regime {
        Some(Regime::Trending) => 1.0,
        Some(Regime::Ranging) => 2.0,
        Some(Regime::Compression) => 3.0,
        Some(Regime::Breakout) => 4.0,
        None => 0.0,
    }
}

/// Decay-weighted aligned-minus-opposing flow share, newest print weighs most
pub fn decayed_flow_bias(setup: &Setup, ctx: &MarketContext) -> f64 {
    let mut aligned = 0.0;
    let mut opposing = 0.0;
    let mut total = 0.0;
    for (i, event) in ctx.recent_flow(FLOW_BIAS_WINDOW).enumerate() {
        let weight = FLOW_BIAS_DECAY.powi(i as i32);
        total += weight;
        if event.direction == setup.direction {
            aligned += weight;
        } else {
            opposing += weight;
        }
    }
    if total <= 0.0 {
        return 0.0;
    }
    ((aligned - opposing) / total).clamp(-1.0, 1.0)
}

fn put_call_ratio(ctx: &MarketContext) -> f64 {
    if let Some(explicit) = ctx.metrics.put_call_ratio.filter(|v| v.is_finite()) {
        return explicit;
    }
    let bullish = ctx
        .flow_events
        .iter()
        .filter(|e| e.direction == crate::common::types::Direction::Bullish)
        .count();
    let bearish = ctx.flow_events.len() - bullish;
    match (bullish, bearish) {
        (0, 0) => 1.0,
        (0, b) => b as f64,
        (c, b) => round_to(b as f64 / c as f64, 4),
    }
}

fn dte(setup: &Setup, ctx: &MarketContext) -> f64 {
    if let Some(explicit) = ctx.metrics.dte.filter(|v| v.is_finite()) {
        return explicit.max(0.0);
    }
    setup.recommended_contract.as_ref().map_or(0.0, |contract| {
        let days = (contract.expiry - ctx.now.date_naive()).num_days();
        days.max(0) as f64
    })
}

fn last_test_result(setup: &Setup) -> f64 {
    let Some(memory) = setup.memory.as_ref().filter(|m| m.tests > 0) else {
        return -1.0;
    };
    if memory.wins > memory.losses {
        return 1.0;
    }
    if memory.losses > memory.wins {
        return 0.0;
    }
    match memory.win_rate_pct {
        Some(rate) if rate >= 50.0 => 1.0,
        Some(_) => 0.0,
        None => -1.0,
    }
}

pub fn extract_features(setup: &Setup, ctx: &MarketContext) -> FeatureVector {
    let now = ctx.now;
    let flow_age = ctx
        .flow_events
        .iter()
        .map(|e| e.timestamp)
        .max()
        .map_or(NO_FLOW_AGE_MINUTES, |latest| {
            round_to(((now - latest).num_milliseconds() as f64 / 60_000.0).max(0.0), 4)
        });

    let inferred_atr14 = ((setup.target1.price - setup.stop).abs() / 2.0).max(0.01);
    let atr14 = ctx
        .metrics
        .atr14
        .filter(|v| v.is_finite())
        .unwrap_or(inferred_atr14)
        .max(0.01);
    let atr7 = ctx
        .metrics
        .atr7
        .filter(|v| v.is_finite())
        .unwrap_or(atr14)
        .max(0.01);

    let cluster_distance = setup
        .cluster_zone
        .as_ref()
        .map_or(0.0, |zone| (setup.entry_mid() - zone.mid()).abs());

    let has_source = |name: &str| {
        if setup.confluence_sources.iter().any(|s| s == name) {
            1.0
        } else {
            0.0
        }
    };

    let day_of_week = ctx
        .metrics
        .day_of_week
        .map_or_else(|| now.weekday().num_days_from_sunday() as f64, f64::from);

    FeatureVector {
        confluence_score: round_to(setup.confluence_score.clamp(0.0, 5.0), 4),
        confluence_flow_age: flow_age,
        confluence_ema_alignment: has_source(SOURCE_REGIME_ALIGNMENT),
        confluence_gex_alignment: has_source(SOURCE_GEX_ALIGNMENT),
        regime_type: regime_code(ctx.regime),
        regime_compatibility: round_to(regime_compatibility(setup.regime, ctx.regime), 4),
        regime_age: round_to(
            ((now - setup.created_at).num_milliseconds() as f64 / 60_000.0).max(0.0),
            4,
        ),
        flow_bias: round_to(decayed_flow_bias(setup, ctx), 4),
        flow_recency: flow_age,
        flow_volume: round_to(ctx.flow_events.iter().map(|e| e.size).sum(), 2),
        flow_sweep_count: ctx
            .flow_events
            .iter()
            .filter(|e| e.event_type == FlowEventType::Sweep)
            .count() as f64,
        distance_to_vwap: round_to(ctx.metrics.distance_to_vwap.unwrap_or(0.0).abs(), 4),
        distance_to_nearest_cluster: round_to(cluster_distance, 4),
        atr14: round_to(atr14, 4),
        atr7_14_ratio: round_to((atr7 / atr14).clamp(0.0, 5.0), 4),
        iv_rank: round_to(ctx.metrics.iv_rank.unwrap_or(50.0).clamp(0.0, 100.0), 4),
        iv_skew: round_to(ctx.metrics.iv_skew.unwrap_or(0.0), 4),
        put_call_ratio: round_to(put_call_ratio(ctx), 4),
        net_gex: round_to(ctx.gex.as_ref().map_or(0.0, |g| g.net_gex), 4),
        minutes_into_session: ctx
            .metrics
            .minutes_into_session
            .unwrap_or(0.0)
            .clamp(0.0, SESSION_LENGTH_MINUTES),
        day_of_week,
        dte: round_to(dte(setup, ctx), 4),
        historical_win_rate: setup
            .memory
            .as_ref()
            .and_then(|m| m.win_rate_pct)
            .map_or(0.5, |pct| round_to((pct / 100.0).clamp(0.0, 1.0), 4)),
        historical_test_count: setup.memory.as_ref().map_or(0.0, |m| f64::from(m.tests)),
        last_test_result: last_test_result(setup),
    }
}
