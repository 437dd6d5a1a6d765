//! Feed health resolution
//!
//! Folds snapshot status, price-source freshness and the orchestrator's trust
//! signals into one health verdict with a fallback stage and a reason code.
//! The reason's `block_trade_entry` flag feeds the entry gates.

use serde::{Deserialize, Serialize};

use super::trust::TrustState;
use crate::config::types::TrustConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataHealth {
    Healthy,
    Degraded,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Tick,
    Poll,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStage {
    LiveStream,
    PollFallback,
    SnapshotFallback,
    LastKnownGood,
}

/// Why the feed is not on the happy path, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedReasonCode {
    None,
    SnapshotDegraded,
    SnapshotError,
    SnapshotRequestLate,
    SequenceGapDetected,
    HeartbeatStale,
    TickSourceStale,
    PollSourceStale,
    SnapshotSourceStale,
    PollFallbackActive,
    SnapshotFallbackActive,
    StreamDisconnectedSnapshot,
}

impl FeedReasonCode {
    /// Reasons that must block new entries
    pub fn blocks_trade_entry(&self) -> bool {
        matches!(
            self,
            FeedReasonCode::SnapshotDegraded
                | FeedReasonCode::SnapshotError
                | FeedReasonCode::SnapshotRequestLate
                | FeedReasonCode::SequenceGapDetected
                | FeedReasonCode::HeartbeatStale
                | FeedReasonCode::TickSourceStale
                | FeedReasonCode::PollSourceStale
                | FeedReasonCode::SnapshotSourceStale
        )
    }

    /// Short badge label
    pub fn label(&self) -> Option<&'static str> {
        match self {
            FeedReasonCode::None => None,
            FeedReasonCode::SnapshotDegraded => Some("Snapshot degraded"),
            FeedReasonCode::SnapshotError => Some("Snapshot error"),
            FeedReasonCode::SnapshotRequestLate => Some("Snapshot delayed"),
            FeedReasonCode::SequenceGapDetected => Some("Sequence gap"),
            FeedReasonCode::HeartbeatStale => Some("Heartbeat stale"),
            FeedReasonCode::TickSourceStale => Some("Tick lag"),
            FeedReasonCode::PollSourceStale => Some("Poll stale"),
            FeedReasonCode::SnapshotSourceStale => Some("Snapshot stale"),
            FeedReasonCode::PollFallbackActive => Some("Poll fallback"),
            FeedReasonCode::SnapshotFallbackActive => Some("Snapshot fallback"),
            FeedReasonCode::StreamDisconnectedSnapshot => Some("Last known good"),
        }
    }
}

/// Staleness limits per price source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessLimits {
    pub tick_stale_ms: i64,
    pub poll_stale_ms: i64,
    pub snapshot_stale_ms: i64,
}

impl Default for FreshnessLimits {
    fn default() -> Self {
        Self {
            tick_stale_ms: 7_500,
            poll_stale_ms: 90_000,
            snapshot_stale_ms: 300_000,
        }
    }
}

impl From<&TrustConfig> for FreshnessLimits {
    fn from(config: &TrustConfig) -> Self {
        Self {
            tick_stale_ms: config.tick_stale_ms,
            poll_stale_ms: config.poll_stale_ms,
            snapshot_stale_ms: config.snapshot_stale_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedHealthInput {
    pub snapshot_is_degraded: bool,
    pub snapshot_degraded_message: Option<String>,
    pub error_message: Option<String>,
    pub snapshot_request_late: bool,
    pub snapshot_available: bool,
    pub stream_connected: bool,
    pub price_source: Option<PriceSource>,
    pub price_age_ms: Option<i64>,
    pub sequence_gap_detected: bool,
    pub heartbeat_stale: bool,
    pub limits: FreshnessLimits,
}

impl FeedHealthInput {
    /// Seed the trust flags from an orchestrator reading
    pub fn with_trust(mut self, trust: &TrustState) -> Self {
        self.sequence_gap_detected = trust.sequence_gap_detected;
        self.heartbeat_stale = trust.heartbeat_stale;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackPolicy {
    pub stage: FallbackStage,
    pub reason_code: FeedReasonCode,
    pub block_trade_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealthFlags {
    pub tick_source_stale: bool,
    pub poll_source_stale: bool,
    pub snapshot_source_stale: bool,
    pub using_poll_fallback: bool,
    pub using_snapshot_fallback: bool,
    pub sequence_gap_detected: bool,
    pub heartbeat_stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealth {
    pub data_health: DataHealth,
    pub message: Option<String>,
    pub fallback_policy: FallbackPolicy,
    pub flags: FeedHealthFlags,
}

pub fn resolve_feed_health(input: &FeedHealthInput) -> FeedHealth {
    let limits = input.limits;
    let source_is = |source: PriceSource| input.price_source == Some(source);
    let aged_past = |limit: i64| input.price_age_ms.is_some_and(|age| age > limit);

    let tick_source_stale = source_is(PriceSource::Tick) && aged_past(limits.tick_stale_ms);
    let poll_source_stale = source_is(PriceSource::Poll) && aged_past(limits.poll_stale_ms);
    let snapshot_source_stale =
        source_is(PriceSource::Snapshot) && aged_past(limits.snapshot_stale_ms);

    let on_fallback_source = source_is(PriceSource::Poll) || source_is(PriceSource::Snapshot);
    let any_source_stale = tick_source_stale || poll_source_stale || snapshot_source_stale;
    let disconnected_with_snapshot = !input.stream_connected && input.snapshot_available;

    let data_health = if input.snapshot_is_degraded
        || input.error_message.is_some()
        || input.snapshot_request_late
    {
        DataHealth::Degraded
    } else if input.sequence_gap_detected
        || input.heartbeat_stale
        || (input.stream_connected && (on_fallback_source || any_source_stale))
        || disconnected_with_snapshot
    {
        DataHealth::Stale
    } else {
        DataHealth::Healthy
    };

    let stage = if disconnected_with_snapshot {
        FallbackStage::LastKnownGood
    } else if source_is(PriceSource::Poll) {
        FallbackStage::PollFallback
    } else if source_is(PriceSource::Snapshot) {
        FallbackStage::SnapshotFallback
    } else {
        FallbackStage::LiveStream
    };

    let reason_code = if input.snapshot_is_degraded {
        FeedReasonCode::SnapshotDegraded
    } else if input.error_message.is_some() {
        FeedReasonCode::SnapshotError
    } else if input.snapshot_request_late && !input.snapshot_available {
        FeedReasonCode::SnapshotRequestLate
    } else if input.sequence_gap_detected {
        FeedReasonCode::SequenceGapDetected
    } else if input.heartbeat_stale {
        FeedReasonCode::HeartbeatStale
    } else if tick_source_stale {
        FeedReasonCode::TickSourceStale
    } else if poll_source_stale {
        FeedReasonCode::PollSourceStale
    } else if snapshot_source_stale {
        FeedReasonCode::SnapshotSourceStale
    } else if source_is(PriceSource::Poll) && input.stream_connected {
        FeedReasonCode::PollFallbackActive
    } else if source_is(PriceSource::Snapshot) && input.stream_connected {
        FeedReasonCode::SnapshotFallbackActive
    } else if data_health == DataHealth::Stale {
        FeedReasonCode::StreamDisconnectedSnapshot
    } else {
        FeedReasonCode::None
    };

    FeedHealth {
        data_health,
        message: health_message(reason_code, input),
        fallback_policy: FallbackPolicy {
            stage,
            reason_code,
            block_trade_entry: reason_code.blocks_trade_entry(),
        },
        flags: FeedHealthFlags {
            tick_source_stale,
            poll_source_stale,
            snapshot_source_stale,
            using_poll_fallback: source_is(PriceSource::Poll),
            using_snapshot_fallback: source_is(PriceSource::Snapshot),
            sequence_gap_detected: input.sequence_gap_detected,
            heartbeat_stale: input.heartbeat_stale,
        },
    }
}

fn health_message(reason: FeedReasonCode, input: &FeedHealthInput) -> Option<String> {
    let text = match reason {
        FeedReasonCode::None => return None,
        FeedReasonCode::SnapshotDegraded => {
            return Some(
                input
                    .snapshot_degraded_message
                    .clone()
                    .unwrap_or_else(|| "Service is running in degraded mode.".to_string()),
            )
        }
        FeedReasonCode::SnapshotError => {
            return Some(input.error_message.clone().unwrap_or_else(|| {
                "Snapshot request failed. Using fallback cache while retrying.".to_string()
            }))
        }
        FeedReasonCode::TickSourceStale => {
            let age = input
                .price_age_ms
                .map(|ms| format!("{}s", ms / 1000))
                .unwrap_or_else(|| "unknown".to_string());
            return Some(format!(
                "Tick stream lag detected ({} behind). Falling back to last known price until feed recovers.",
                age
            ));
        }
        FeedReasonCode::SnapshotRequestLate => {
            "Snapshot request is delayed. Core chart stream is still active while analytics recover."
        }
        FeedReasonCode::SequenceGapDetected => {
            "Realtime sequence gap detected. Holding conservative feed trust until packet order recovers."
        }
        FeedReasonCode::HeartbeatStale => {
            "Realtime heartbeat stalled. Waiting for fresh packets while preserving last known state."
        }
        FeedReasonCode::PollSourceStale => {
            "Poll fallback data is stale. Waiting for fresher provider bars or tick feed recovery."
        }
        FeedReasonCode::SnapshotSourceStale => {
            "Snapshot fallback data is stale. Waiting for fresher provider bars or tick feed recovery."
        }
        FeedReasonCode::PollFallbackActive => {
            "Live tick feed unavailable. Streaming over poll fallback, so price updates may lag."
        }
        FeedReasonCode::SnapshotFallbackActive => {
            "Stream connected but no live price packets received yet. Running on snapshot fallback."
        }
        FeedReasonCode::StreamDisconnectedSnapshot => {
            "Live stream disconnected and snapshot is stale. Reconnecting in background."
        }
    };
    Some(text.to_string())
}
