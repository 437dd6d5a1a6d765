//! Common test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::json;
use setup_decision_core::ml::registry::ModelRegistry;
use setup_decision_core::{
    normalize_realtime_event, MlLayer, NormalizedEvent, RawEvent, RolloutPolicies, Setup,
};

/// 2026-03-16T14:30:00Z
pub const SESSION_T0: i64 = 1_773_671_400_000;

/// Shared registry with the bundled models installed
pub static BUILTIN_REGISTRY: Lazy<Arc<ModelRegistry>> =
    Lazy::new(|| Arc::new(ModelRegistry::with_builtin_defaults()));

pub fn ml_layer() -> Arc<MlLayer> {
    Arc::new(MlLayer::new(Arc::clone(&BUILTIN_REGISTRY), RolloutPolicies::default()))
}

/// Normalize a wire message, receiving it at `received_at_ms`
pub fn wire(value: serde_json::Value, received_at_ms: i64) -> NormalizedEvent {
    let raw = RawEvent::from_json(&value.to_string()).expect("fixture is valid JSON");
    normalize_realtime_event(&raw, received_at_ms).expect("fixture normalizes")
}

pub fn price_msg(symbol: &str, price: f64, at_ms: i64, sequence: u64) -> serde_json::Value {
    json!({
        "type": "price",
        "channel": format!("price:{}", symbol),
        "symbol": symbol,
        "price": price,
        "timestamp": at_ms,
        "sequence": sequence,
    })
}

/// Bullish fade at 5000 with stop 4995 and targets 5010/5020
pub fn bullish_setup_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "fade_at_wall",
        "direction": "bullish",
        "entryZone": { "low": 5000.0, "high": 5002.0 },
        "stop": 4995.0,
        "target1": { "price": 5010.0, "label": "Target 1" },
        "target2": { "price": 5020.0, "label": "Target 2" },
        "confluenceScore": 3.0,
        "regime": "ranging",
        "status": status,
        "probability": 60.0,
        "createdAt": "2026-03-16T14:30:00Z",
    })
}

/// The bullish fade as a typed `Setup`, already ready
pub fn ready_setup() -> Setup {
    serde_json::from_value(bullish_setup_json("s1", "ready")).expect("fixture is a valid setup")
}

pub fn setup_msg(setup: serde_json::Value, at_ms: i64) -> serde_json::Value {
    json!({
        "type": "spx_setup",
        "channel": "setups:update",
        "timestamp": at_ms,
        "data": { "setup": setup, "action": "created", "symbol": "SPX" },
    })
}

pub fn coach_msg(id: &str, setup_id: &str, content: &str, at_ms: i64) -> serde_json::Value {
    json!({
        "type": "spx_coach",
        "channel": "coach:message",
        "timestamp": at_ms,
        "data": {
            "id": id,
            "type": "pre_trade",
            "priority": "setup",
            "setupId": setup_id,
            "content": content,
            "symbol": "SPX",
        },
    })
}

pub fn levels_msg(prices: &[(f64, &str, &str)], at_ms: i64) -> serde_json::Value {
    let levels: Vec<serde_json::Value> = prices
        .iter()
        .map(|(price, category, source)| {
            json!({
                "symbol": "SPX",
                "category": category,
                "price": price,
                "strength": "strong",
                "source": source,
            })
        })
        .collect();
    json!({
        "type": "spx_levels",
        "channel": "levels:update",
        "timestamp": at_ms,
        "data": { "levels": levels },
    })
}
