//! Execution entry gate: feed trust, broker connectivity, execution mode

use serde::{Deserialize, Serialize};

use super::envelope::{GateDecision, GateReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Off,
    Paper,
    Live,
}

/// Whether an entry may be routed to the broker
///
/// When the feed is untrusted its message wins, even if the broker is also
/// down.
pub fn resolve_execution_entry_gate(
    feed_trust_blocked: bool,
    feed_message: Option<&str>,
    broker_connected: bool,
    mode: ExecutionMode,
) -> GateDecision {
    if feed_trust_blocked {
        let message = feed_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Market data feed is not trusted; entries are paused");
        return GateDecision::block(GateReason::FeedTrustBlocked, message);
    }
    if !broker_connected {
        return GateDecision::block(
            GateReason::BrokerDisconnected,
            "Broker is disconnected; reconnect before entering",
        );
    }
    if mode == ExecutionMode::Off {
        return GateDecision::block(
            GateReason::ExecutionModeOff,
            "Execution mode is off; enable paper or live to enter",
        );
    }
    GateDecision::allow()
}
