//! Rolling per-symbol market snapshot consumed by scoring

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{GexUpdate, RegimeDirection, RegimeUpdate};
use crate::common::types::{Direction, FlowEvent, Regime};

/// Flow prints retained per symbol, newest first
pub const FLOW_HISTORY_LIMIT: usize = 64;

/// Directional odds in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionOdds {
    pub bullish: f64,
    pub bearish: f64,
    pub neutral: f64,
}

impl DirectionOdds {
    /// Odds that favor `direction`, as a fraction in [0, 1]
    pub fn score_for(&self, direction: Direction) -> f64 {
        let pct = match direction {
            Direction::Bullish => self.bullish,
            Direction::Bearish => self.bearish,
        };
        (pct / 100.0).clamp(0.0, 1.0)
    }

    /// Build odds from a regime broadcast's direction and probability
    pub fn from_regime(update: &RegimeUpdate) -> Option<Self> {
        let probability = update.probability?.clamp(0.0, 100.0);
        let rest = 100.0 - probability;
        let odds = match update.direction.as_ref()? {
            RegimeDirection::Bullish => Self {
                bullish: probability,
                bearish: rest / 2.0,
                neutral: rest / 2.0,
            },
            RegimeDirection::Bearish => Self {
                bullish: rest / 2.0,
                bearish: probability,
                neutral: rest / 2.0,
            },
            RegimeDirection::Neutral => Self {
                bullish: rest / 2.0,
                bearish: rest / 2.0,
                neutral: probability,
            },
        };
        Some(odds)
    }
}

/// Which instrument is leading the basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisLeader {
    #[serde(rename = "SPX")]
    Index,
    #[serde(rename = "SPY")]
    Etf,
    #[serde(rename = "neutral")]
    Neutral,
}

/// Optional analytics supplied alongside the stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMetrics {
    pub atr14: Option<f64>,
    pub atr7: Option<f64>,
    pub distance_to_vwap: Option<f64>,
    pub iv_rank: Option<f64>,
    pub iv_skew: Option<f64>,
    pub put_call_ratio: Option<f64>,
    pub dte: Option<f64>,
    /// Minutes since the regular session opened, 0-390
    pub minutes_into_session: Option<f64>,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: Option<u8>,
}

/// Everything the scorers know about one symbol right now
#[derive(Debug, Clone, PartialEq)]
pub struct MarketContext {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub last_price_at_ms: Option<i64>,
    pub regime: Option<Regime>,
    pub prediction: Option<DirectionOdds>,
    pub basis: Option<BasisLeader>,
    pub gex: Option<GexUpdate>,
    /// Newest first
    pub flow_events: VecDeque<FlowEvent>,
    pub metrics: MarketMetrics,
    pub now: DateTime<Utc>,
}

impl MarketContext {
    pub fn new(symbol: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: None,
            last_price_at_ms: None,
            regime: None,
            prediction: None,
            basis: None,
            gex: None,
            flow_events: VecDeque::new(),
            metrics: MarketMetrics::default(),
            now,
        }
    }

    pub fn record_price(&mut self, price: f64, at_ms: i64) {
        self.last_price = Some(price);
        self.last_price_at_ms = Some(at_ms);
    }

    pub fn record_regime(&mut self, update: &RegimeUpdate) {
        self.regime = Some(update.regime);
        if let Some(odds) = DirectionOdds::from_regime(update) {
            self.prediction = Some(odds);
        }
    }

    /// Push a flow print to the front, keeping the newest [`FLOW_HISTORY_LIMIT`]
    pub fn record_flow(&mut self, event: FlowEvent) {
        self.flow_events.push_front(event);
        self.flow_events.truncate(FLOW_HISTORY_LIMIT);
    }

    /// Newest `limit` flow prints
    pub fn recent_flow(&self, limit: usize) -> impl Iterator<Item = &FlowEvent> {
        self.flow_events.iter().take(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::FlowEventType;

    fn flow(id: &str, direction: Direction) -> FlowEvent {
        FlowEvent {
            id: id.to_string(),
            event_type: FlowEventType::Block,
            symbol: "SPX".to_string(),
            strike: 5000.0,
            size: 10.0,
            direction,
            premium: 1000.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_flow_history_is_newest_first_and_bounded() {
        let mut ctx = MarketContext::new("SPX", Utc::now());
        for i in 0..(FLOW_HISTORY_LIMIT + 5) {
            ctx.record_flow(flow(&i.to_string(), Direction::Bullish));
        }
        assert_eq!(ctx.flow_events.len(), FLOW_HISTORY_LIMIT);
        assert_eq!(ctx.flow_events[0].id, (FLOW_HISTORY_LIMIT + 4).to_string());
    }

    #[test]
    fn test_regime_probability_becomes_odds() {
        let update = RegimeUpdate {
            regime: Regime::Trending,
            direction: Some(RegimeDirection::Bearish),
            probability: Some(70.0),
            confidence: None,
        };
        let mut ctx = MarketContext::new("SPX", Utc::now());
        ctx.record_regime(&update);

        let odds = ctx.prediction.unwrap();
        assert_eq!(ctx.regime, Some(Regime::Trending));
        assert!((odds.score_for(Direction::Bearish) - 0.7).abs() < 1e-12);
        assert!((odds.score_for(Direction::Bullish) - 0.15).abs() < 1e-12);
    }
}
