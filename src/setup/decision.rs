//! Rule-based setup decision evaluation
//!
//! Scores how well the live context supports a setup across four timeframes
//! and turns that into a confidence, an expected value in R and short
//! driver/risk narratives. This is also the fallback when the confidence
//! model is not rolled out for a user.

use serde::{Deserialize, Serialize};

use crate::common::types::{ConfidenceTrend, Direction, Setup};
use crate::levels::confluence::{flow_alignment_bias, gex_aligned, FLOW_CONFIRMATION_WINDOW};
use crate::levels::regime::regime_compatibility;
use crate::market::context::{BasisLeader, MarketContext};
use crate::ml::mtf::TimeframeWeights;

pub const MAX_DRIVERS: usize = 3;
pub const MAX_RISKS: usize = 3;

/// Confidence moving at least this far from the base probability sets a trend
const TREND_THRESHOLD: f64 = 5.0;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Per-timeframe alignment, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeAlignment {
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,
    pub h1: f64,
}

/// Component scores feeding the alignment blend, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionInputs {
    pub regime_score: f64,
    pub prediction_score: f64,
    /// Aligned minus opposing flow share, in [-1, 1]
    pub flow_bias: f64,
    pub flow_score: f64,
    pub gex_score: f64,
    pub basis_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupDecision {
    pub setup_id: String,
    pub timeframes: TimeframeAlignment,
    /// Weighted alignment, 0-100
    pub alignment_score: f64,
    /// Rule-based confidence, 5-95
    pub confidence: f64,
    pub confidence_trend: ConfidenceTrend,
    pub ev_r: f64,
    pub drivers: Vec<String>,
    pub risks: Vec<String>,
    pub freshness_ms: i64,
    pub inputs: DecisionInputs,
}

fn gex_score(setup: &Setup, ctx: &MarketContext) -> f64 {
    match &ctx.gex {
        Some(gex) if gex_aligned(gex.net_gex, setup.direction) => 0.75,
        Some(_) => 0.35,
        None => 0.5,
    }
}

fn basis_score(direction: Direction, basis: Option<BasisLeader>) -> f64 {
    match (basis, direction) {
        (None, _) => 0.5,
        (Some(BasisLeader::Neutral), _) => 0.52,
        (Some(BasisLeader::Index), Direction::Bullish) => 0.72,
        (Some(BasisLeader::Etf), Direction::Bearish) => 0.72,
        (Some(_), _) => 0.38,
    }
}

pub fn decision_inputs(setup: &Setup, ctx: &MarketContext) -> DecisionInputs {
    let flow_bias = flow_alignment_bias(ctx, setup.direction, FLOW_CONFIRMATION_WINDOW);
    DecisionInputs {
        regime_score: regime_compatibility(setup.regime, ctx.regime),
        prediction_score: ctx
            .prediction
            .map_or(0.5, |odds| odds.score_for(setup.direction)),
        flow_bias,
        flow_score: (flow_bias + 1.0) / 2.0,
        gex_score: gex_score(setup, ctx),
        basis_score: basis_score(setup.direction, ctx.basis),
    }
}

pub fn timeframe_alignment(inputs: &DecisionInputs) -> TimeframeAlignment {
    let DecisionInputs {
        regime_score: regime,
        prediction_score: pred,
        flow_score: flow,
        gex_score: gex,
        basis_score: basis,
        ..
    } = *inputs;

    TimeframeAlignment {
        m1: round_to(0.25 * pred + 0.45 * flow + 0.15 * gex + 0.15 * basis, 4),
        m5: round_to(
            0.35 * regime + 0.25 * pred + 0.2 * flow + 0.1 * gex + 0.1 * basis,
            4,
        ),
        m15: round_to(0.5 * regime + 0.2 * pred + 0.15 * flow + 0.15 * basis, 4),
        h1: round_to(0.6 * regime + 0.15 * pred + 0.1 * flow + 0.15 * gex, 4),
    }
}

/// Expected value in R multiples; 0 when risk or reward is degenerate
pub fn expected_value_r(p_win: f64, risk_points: f64, reward_points: f64) -> f64 {
    if risk_points <= 0.0 || reward_points <= 0.0 {
        return 0.0;
    }
    let rr = reward_points / risk_points;
    round_to(p_win * rr - (1.0 - p_win), 2)
}

fn confidence_trend(confidence: f64, probability: f64) -> ConfidenceTrend {
    let delta = confidence - probability;
    if delta >= TREND_THRESHOLD {
        ConfidenceTrend::Up
    } else if delta <= -TREND_THRESHOLD {
        ConfidenceTrend::Down
    } else {
        ConfidenceTrend::Flat
    }
}

fn drivers(setup: &Setup, inputs: &DecisionInputs, alignment: f64) -> Vec<String> {
    let mut out = Vec::new();
    if alignment >= 62.0 {
        out.push(format!("Alignment {}% across 1m/5m/15m/1h", alignment.round()));
    }
    if inputs.flow_bias >= 0.15 {
        out.push(format!("Flow confirms {} pressure", setup.direction));
    }
    if inputs.regime_score >= 0.8 {
        out.push(format!("Regime alignment supports {}", setup.regime));
    }
    if inputs.prediction_score >= 0.58 {
        out.push(format!("Prediction favors {} continuation", setup.direction));
    }
    if inputs.gex_score >= 0.7 {
        out.push("Gamma structure supports directional follow-through".to_string());
    }
    if out.is_empty() {
        out.push("Confluence base remains valid but confirmation is mixed".to_string());
    }
    out.truncate(MAX_DRIVERS);
    out
}

fn risks(setup: &Setup, inputs: &DecisionInputs, trend: ConfidenceTrend) -> Vec<String> {
    let mut out = Vec::new();
    if inputs.regime_score < 0.45 {
        out.push(format!("Regime mismatch risk vs {} profile", setup.regime));
    }
    if inputs.flow_bias <= -0.15 {
        out.push("Recent flow is diverging from setup direction".to_string());
    }
    if inputs.prediction_score < 0.45 {
        out.push("Directional prediction confidence is soft".to_string());
    }
    if trend == ConfidenceTrend::Down {
        out.push("Confidence trend is decelerating".to_string());
    }
    if out.is_empty() {
        out.push("No elevated structural risk beyond baseline stop discipline".to_string());
    }
    out.truncate(MAX_RISKS);
    out
}

pub fn evaluate_setup_decision(
    setup: &Setup,
    ctx: &MarketContext,
    weights: &TimeframeWeights,
) -> SetupDecision {
    let inputs = decision_inputs(setup, ctx);
    let timeframes = timeframe_alignment(&inputs);

    let blended = weights.m1 * timeframes.m1
        + weights.m5 * timeframes.m5
        + weights.m15 * timeframes.m15
        + weights.h1 * timeframes.h1;
    let alignment_score = round_to(blended * 100.0, 2);

    let regime_penalty = if inputs.regime_score < 0.45 { 6.0 } else { 0.0 };
    let raw = 20.0
        + alignment_score * 0.55
        + setup.confluence_score / 5.0 * 22.0
        + setup.probability.clamp(0.0, 100.0) * 0.2
        + inputs.flow_bias * 8.0
        - regime_penalty;
    let confidence = round_to(raw.clamp(5.0, 95.0), 2);

    let trend = confidence_trend(confidence, setup.probability);
    let p_win = confidence / 100.0;

    SetupDecision {
        setup_id: setup.id.clone(),
        timeframes,
        alignment_score,
        confidence,
        confidence_trend: trend,
        ev_r: expected_value_r(p_win, setup.risk_points(), setup.reward_points()),
        drivers: drivers(setup, &inputs, alignment_score),
        risks: risks(setup, &inputs, trend),
        freshness_ms: (ctx.now - setup.reference_time()).num_milliseconds().max(0),
        inputs,
    }
}

/// Write a decision's scores and narratives onto the setup
pub fn enrich_setup(setup: &mut Setup, decision: &SetupDecision) {
    setup.p_win_calibrated = Some(round_to(decision.confidence / 100.0, 4));
    setup.ev_r = Some(decision.ev_r);
    setup.alignment_score = Some(decision.alignment_score.round());
    setup.confidence = Some(decision.confidence);
    setup.confidence_trend = Some(decision.confidence_trend);
    setup.decision_drivers = decision.drivers.clone();
    setup.decision_risks = decision.risks.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{FlowEvent, FlowEventType, Regime, SetupStatus};
    use crate::market::context::DirectionOdds;
    use crate::market::events::GexUpdate;
    use crate::setup::fixtures::sample_setup;
    use chrono::Duration;

    fn context(setup: &Setup) -> MarketContext {
        MarketContext::new("SPX", setup.created_at + Duration::seconds(90))
    }

    fn flow(direction: Direction, setup: &Setup) -> FlowEvent {
        FlowEvent {
            id: "f".to_string(),
            event_type: FlowEventType::Sweep,
            symbol: "SPX".to_string(),
            strike: 5000.0,
            size: 100.0,
            direction,
            premium: 50_000.0,
            timestamp: setup.created_at,
        }
    }

    #[test]
    fn test_neutral_context_is_half_aligned() {
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let ctx = context(&setup);
        let decision = evaluate_setup_decision(&setup, &ctx, &TimeframeWeights::default());

        assert_eq!(decision.timeframes.m1, 0.5);
        assert_eq!(decision.alignment_score, 50.0);
        // 20 + 27.5 + 13.2 + 12 = 72.7
        assert_eq!(decision.confidence, 72.7);
        assert_eq!(decision.confidence_trend, ConfidenceTrend::Up);
        assert_eq!(decision.freshness_ms, 90_000);
        assert_eq!(
            decision.drivers,
            vec!["Confluence base remains valid but confirmation is mixed"]
        );
    }

    #[test]
    fn test_supportive_context_lists_drivers() {
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let mut ctx = context(&setup);
        ctx.regime = Some(Regime::Ranging);
        ctx.prediction = Some(DirectionOdds {
            bullish: 70.0,
            bearish: 20.0,
            neutral: 10.0,
        });
        ctx.gex = Some(GexUpdate {
            net_gex: 1.5e9,
            flip_point: None,
            call_wall: None,
            put_wall: None,
        });
        for _ in 0..4 {
            ctx.record_flow(flow(Direction::Bullish, &setup));
        }

        let decision = evaluate_setup_decision(&setup, &ctx, &TimeframeWeights::default());
        assert!(decision.alignment_score >= 62.0);
        assert_eq!(decision.drivers.len(), MAX_DRIVERS);
        assert!(decision.drivers[0].starts_with("Alignment"));
        assert_eq!(decision.drivers[1], "Flow confirms bullish pressure");
    }

    #[test]
    fn test_hostile_context_lists_risks() {
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let mut ctx = context(&setup);
        ctx.regime = Some(Regime::Trending);
        ctx.prediction = Some(DirectionOdds {
            bullish: 20.0,
            bearish: 70.0,
            neutral: 10.0,
        });
        ctx.record_flow(flow(Direction::Bearish, &setup));

        let decision = evaluate_setup_decision(&setup, &ctx, &TimeframeWeights::default());
        assert_eq!(decision.risks[0], "Regime mismatch risk vs ranging profile");
        assert_eq!(decision.risks[1], "Recent flow is diverging from setup direction");
        assert_eq!(decision.risks.len(), MAX_RISKS);
    }

    #[test]
    fn test_expected_value() {
        assert_eq!(expected_value_r(0.5, 5.0, 10.0), 0.5);
        assert_eq!(expected_value_r(0.6, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_enrich_writes_scores() {
        let mut setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let ctx = context(&setup);
        let decision = evaluate_setup_decision(&setup, &ctx, &TimeframeWeights::default());
        enrich_setup(&mut setup, &decision);

        assert_eq!(setup.p_win_calibrated, Some(0.727));
        assert_eq!(setup.alignment_score, Some(50.0));
        assert!(!setup.decision_risks.is_empty());
    }
}
