//! Coach message and decision brief types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::types::TradeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachMessageType {
    PreTrade,
    InTrade,
    Behavioral,
    PostTrade,
    Alert,
}

impl CoachMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachMessageType::PreTrade => "pre_trade",
            CoachMessageType::InTrade => "in_trade",
            CoachMessageType::Behavioral => "behavioral",
            CoachMessageType::PostTrade => "post_trade",
            CoachMessageType::Alert => "alert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachPriority {
    Alert,
    Setup,
    Guidance,
    Behavioral,
}

impl CoachPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachPriority::Alert => "alert",
            CoachPriority::Setup => "setup",
            CoachPriority::Guidance => "guidance",
            CoachPriority::Behavioral => "behavioral",
        }
    }
}

/// One narration entry. Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: CoachMessageType,
    pub priority: CoachPriority,
    #[serde(default)]
    pub setup_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub structured_data: Value,
    pub timestamp: DateTime<Utc>,
}

impl CoachMessage {
    /// String field of `structuredData`, if present
    pub fn structured_str(&self, key: &str) -> Option<&str> {
        self.structured_data.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Enter,
    Wait,
    Reduce,
    Exit,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Enter => write!(f, "ENTER"),
            Verdict::Wait => write!(f, "WAIT"),
            Verdict::Reduce => write!(f, "REDUCE"),
            Verdict::Exit => write!(f, "EXIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Routine,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    AiV2,
    FallbackV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionId {
    EnterTradeFocus,
    ExitTradeFocus,
    RevertAiContract,
    TightenStopGuidance,
    ReduceSizeGuidance,
    AskFollowUp,
    OpenHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    Primary,
    Secondary,
    Ghost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachAction {
    pub id: ActionId,
    pub label: String,
    pub style: ActionStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CoachAction {
    /// `setupId` carried in the payload, if any
    pub fn payload_setup_id(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("setupId"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPlan {
    #[serde(default)]
    pub invalidation: Option<String>,
    #[serde(default)]
    pub stop: Option<f64>,
    #[serde(default)]
    pub max_risk_dollars: Option<Decimal>,
    #[serde(default)]
    pub position_guidance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Freshness {
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub stale: bool,
}

impl Freshness {
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.generated_at).num_milliseconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.stale || now >= self.expires_at
    }
}

/// Structured recommendation shown for a setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachDecisionBrief {
    pub decision_id: String,
    pub setup_id: Option<String>,
    pub verdict: Verdict,
    /// 0-100
    pub confidence: u8,
    pub primary_text: String,
    pub why: Vec<String>,
    pub risk_plan: RiskPlan,
    pub actions: Vec<CoachAction>,
    pub severity: Severity,
    pub freshness: Freshness,
    pub context_hash: String,
    pub source: DecisionSource,
}

/// Contract fields the trader has selected in the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedContract {
    pub description: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub risk_reward: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachDecisionRequest {
    #[serde(default)]
    pub setup_id: Option<String>,
    #[serde(default)]
    pub trade_mode: Option<TradeMode>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub selected_contract: Option<SelectedContract>,
}
