//! Market data trust orchestration
//!
//! Tracks per-channel sequence continuity and heartbeat liveness. A detected
//! gap is sticky: it stays set until [`MarketDataOrchestrator::clear_sequence_gap`]
//! or [`MarketDataOrchestrator::reset`] is called.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::events::NormalizedEvent;
use crate::config::types::TrustConfig;

/// Default silence before the heartbeat is considered stale
pub const HEARTBEAT_STALE_MS: i64 = 15_000;

/// Orchestrator thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustThresholds {
    pub heartbeat_stale_ms: i64,
    pub sequence_gap_tolerance: u64,
}

impl Default for TrustThresholds {
    fn default() -> Self {
        Self {
            heartbeat_stale_ms: HEARTBEAT_STALE_MS,
            sequence_gap_tolerance: 0,
        }
    }
}

impl From<&TrustConfig> for TrustThresholds {
    fn from(config: &TrustConfig) -> Self {
        Self {
            heartbeat_stale_ms: config.heartbeat_stale_ms,
            sequence_gap_tolerance: config.sequence_gap_tolerance,
        }
    }
}

/// Point-in-time feed trust
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustState {
    pub sequence_gap_detected: bool,
    pub heartbeat_stale: bool,
    pub last_event_at_ms: Option<i64>,
    pub last_sequence_by_channel: BTreeMap<String, u64>,
}

impl TrustState {
    /// True when either trust signal is raised
    pub fn is_degraded(&self) -> bool {
        self.sequence_gap_detected || self.heartbeat_stale
    }
}

/// Single-writer trust tracker for one symbol's stream
#[derive(Debug, Default)]
pub struct MarketDataOrchestrator {
    thresholds: TrustThresholds,
    last_event_at_ms: Option<i64>,
    last_sequence_by_channel: BTreeMap<String, u64>,
    sequence_gap_detected: bool,
}

impl MarketDataOrchestrator {
    pub fn new(thresholds: TrustThresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> TrustThresholds {
        self.thresholds
    }

    /// Record receipt time and sequence for an event
    ///
    /// Duplicate or out-of-order sequences never move the high-water mark and
    /// never raise a gap.
    pub fn ingest(&mut self, event: &NormalizedEvent) {
        self.last_event_at_ms = Some(
            self.last_event_at_ms
                .map_or(event.received_at_ms, |prev| prev.max(event.received_at_ms)),
        );

        let Some(next) = event.sequence else {
            return;
        };
        let key = event.channel.key();

        match self.last_sequence_by_channel.get(&key).copied() {
            Some(prev) if next <= prev => {
                debug!(channel = %key, prev, next, "Ignoring stale sequence");
            }
            Some(prev) => {
                let allowed = prev
                    .saturating_add(self.thresholds.sequence_gap_tolerance)
                    .saturating_add(1);
                if next > allowed {
                    warn!(channel = %key, prev, next, "Sequence gap detected");
                    self.sequence_gap_detected = true;
                }
                self.last_sequence_by_channel.insert(key, next);
            }
            None => {
                self.last_sequence_by_channel.insert(key, next);
            }
        }
    }

    /// Pure read of the current trust state
    ///
    /// Heartbeat staleness is only evaluated while the stream is connected and
    /// after at least one event has arrived.
    pub fn evaluate(&self, now_ms: i64, stream_connected: bool) -> TrustState {
        let heartbeat_stale = stream_connected
            && self
                .last_event_at_ms
                .is_some_and(|last| now_ms - last > self.thresholds.heartbeat_stale_ms);

        TrustState {
            sequence_gap_detected: self.sequence_gap_detected,
            heartbeat_stale,
            last_event_at_ms: self.last_event_at_ms,
            last_sequence_by_channel: self.last_sequence_by_channel.clone(),
        }
    }

    /// Acknowledge a gap; sequence high-water marks are kept
    pub fn clear_sequence_gap(&mut self) {
        if self.sequence_gap_detected {
            debug!("Sequence gap acknowledged");
        }
        self.sequence_gap_detected = false;
    }

    /// Forget everything, e.g. after a reconnect with fresh sequence numbering
    pub fn reset(&mut self) {
        self.last_event_at_ms = None;
        self.last_sequence_by_channel.clear();
        self.sequence_gap_detected = false;
    }
}
