//! Risk envelope entry gate
//!
//! Checks, in priority order: feed trust, alignment, confidence. The first
//! failing check decides the reason. A setup that has not been scored yet
//! fails closed.

use serde::{Deserialize, Serialize};

use crate::common::types::Setup;
use crate::config::types::GateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    FeedTrustBlocked,
    LowAlignment,
    LowConfidence,
    BrokerDisconnected,
    ExecutionModeOff,
    Allow,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::FeedTrustBlocked => "feed_trust_blocked",
            GateReason::LowAlignment => "low_alignment",
            GateReason::LowConfidence => "low_confidence",
            GateReason::BrokerDisconnected => "broker_disconnected",
            GateReason::ExecutionModeOff => "execution_mode_off",
            GateReason::Allow => "allow",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one entry checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub blocked: bool,
    pub reason_code: GateReason,
    pub message: String,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            blocked: false,
            reason_code: GateReason::Allow,
            message: "Entry allowed".to_string(),
        }
    }

    pub fn block(reason_code: GateReason, message: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason_code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEnvelopeThresholds {
    /// Minimum alignment score, 0-100
    pub min_alignment: f64,
    /// Minimum confidence, 0-100
    pub min_confidence: f64,
}

impl Default for RiskEnvelopeThresholds {
    fn default() -> Self {
        Self {
            min_alignment: 55.0,
            min_confidence: 60.0,
        }
    }
}

impl From<&GateConfig> for RiskEnvelopeThresholds {
    fn from(config: &GateConfig) -> Self {
        Self {
            min_alignment: config.min_alignment,
            min_confidence: config.min_confidence,
        }
    }
}

pub fn evaluate_risk_envelope_entry_gate(
    setup: &Setup,
    feed_trust_blocked: bool,
    thresholds: &RiskEnvelopeThresholds,
) -> GateDecision {
    if feed_trust_blocked {
        return GateDecision::block(
            GateReason::FeedTrustBlocked,
            "Market data feed is not trusted; entries are paused",
        );
    }

    match setup.alignment_score.filter(|v| v.is_finite()) {
        Some(alignment) if alignment >= thresholds.min_alignment => {}
        Some(alignment) => {
            return GateDecision::block(
                GateReason::LowAlignment,
                format!(
                    "Alignment {alignment:.0}% is below the {:.0}% floor",
                    thresholds.min_alignment
                ),
            )
        }
        None => {
            return GateDecision::block(
                GateReason::LowAlignment,
                "Alignment has not been scored for this setup",
            )
        }
    }

    match setup.confidence.filter(|v| v.is_finite()) {
        Some(confidence) if confidence >= thresholds.min_confidence => GateDecision::allow(),
        Some(confidence) => GateDecision::block(
            GateReason::LowConfidence,
            format!(
                "Confidence {confidence:.0}% is below the {:.0}% floor",
                thresholds.min_confidence
            ),
        ),
        None => GateDecision::block(
            GateReason::LowConfidence,
            "Confidence has not been scored for this setup",
        ),
    }
}
