//! Rule-based coach decision
//!
//! Builds a [`CoachDecisionBrief`] from recent narration when no model
//! decision is available. Messages are expected newest first.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::types::{
    ActionId, ActionStyle, CoachAction, CoachDecisionBrief, CoachDecisionRequest, CoachMessage,
    CoachPriority, DecisionSource, Freshness, RiskPlan, SelectedContract, Severity, Verdict,
};
use crate::common::types::TradeMode;

pub const DECISION_TTL_MS: i64 = 60_000;
pub const WHY_LIMIT: usize = 3;
pub const MIN_ENTER_CONFIDENCE: u8 = 45;

const COMPACT_SENTENCE_CHARS: usize = 160;
const MAX_ACTIONS: usize = 3;

/// Collapse whitespace and clip long narration to 160 characters
pub fn to_compact_sentence(value: &str) -> String {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= COMPACT_SENTENCE_CHARS {
        return normalized;
    }
    let clipped: String = normalized.chars().take(COMPACT_SENTENCE_CHARS - 3).collect();
    format!("{}...", clipped)
}

fn infer_severity(messages: &[CoachMessage]) -> Severity {
    if messages
        .iter()
        .any(|m| m.structured_str("severity") == Some("critical"))
    {
        Severity::Critical
    } else if messages.iter().any(|m| m.priority == CoachPriority::Alert) {
        Severity::Warning
    } else {
        Severity::Routine
    }
}

fn infer_verdict(messages: &[CoachMessage], trade_mode: TradeMode) -> Verdict {
    let aggregate = messages
        .iter()
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let in_trade = trade_mode == TradeMode::InTrade;

    if in_trade {
        if aggregate.contains("exit") {
            return Verdict::Exit;
        }
        if aggregate.contains("tighten") || aggregate.contains("reduce") {
            return Verdict::Reduce;
        }
    }
    if aggregate.contains("entry window open") || aggregate.contains("pre-trade brief") {
        return Verdict::Enter;
    }
    if aggregate.contains("risk reminder") || aggregate.contains("divergence") {
        return if in_trade { Verdict::Reduce } else { Verdict::Wait };
    }
    Verdict::Wait
}

fn infer_confidence(messages: &[CoachMessage], verdict: Verdict) -> u8 {
    let setup_signals = messages.iter().filter(|m| m.priority == CoachPriority::Setup).count() as i64;
    let alert_signals = messages.iter().filter(|m| m.priority == CoachPriority::Alert).count() as i64;
    let base: i64 = match verdict {
        Verdict::Enter => 72,
        Verdict::Reduce => 70,
        Verdict::Exit => 74,
        Verdict::Wait => 62,
    };
    (base + setup_signals * 4 - alert_signals * 3).clamp(0, 100) as u8
}

fn build_why(messages: &[CoachMessage]) -> Vec<String> {
    let mut lines: Vec<String> = Vec::with_capacity(WHY_LIMIT);
    for message in messages {
        let sentence = to_compact_sentence(&message.content);
        if sentence.is_empty() || lines.contains(&sentence) {
            continue;
        }
        lines.push(sentence);
        if lines.len() >= WHY_LIMIT {
            break;
        }
    }
    if lines.is_empty() {
        lines.push("Coach context is temporarily limited. Use risk-first execution rules.".to_string());
    }
    lines
}

fn primary_text(verdict: Verdict, why: &[String]) -> String {
    match verdict {
        Verdict::Enter => {
            "Entry conditions currently favor execution. Validate risk and enter with discipline.".to_string()
        }
        Verdict::Reduce => "Risk is elevated. Reduce exposure and protect downside immediately.".to_string(),
        Verdict::Exit => "Exit is favored on current context. Prioritize capital protection.".to_string(),
        Verdict::Wait => why
            .first()
            .cloned()
            .unwrap_or_else(|| "Wait for clearer confirmation before acting.".to_string()),
    }
}

fn next_style(actions: &[CoachAction], otherwise: ActionStyle) -> ActionStyle {
    if actions.is_empty() {
        ActionStyle::Primary
    } else {
        otherwise
    }
}

fn build_actions(request: &CoachDecisionRequest, trade_mode: TradeMode, verdict: Verdict) -> Vec<CoachAction> {
    let setup_id = request.setup_id.as_deref();
    let payload = setup_id.map(|id| json!({ "setupId": id }));
    let mut actions: Vec<CoachAction> = Vec::with_capacity(MAX_ACTIONS + 1);

    if setup_id.is_some() && verdict == Verdict::Enter {
        actions.push(CoachAction {
            id: ActionId::EnterTradeFocus,
            label: "Enter Trade Focus".to_string(),
            style: ActionStyle::Primary,
            payload: payload.clone(),
        });
    }

    if setup_id.is_some() && trade_mode != TradeMode::InTrade {
        actions.push(CoachAction {
            id: ActionId::RevertAiContract,
            label: "Use AI Contract".to_string(),
            style: next_style(&actions, ActionStyle::Secondary),
            payload: payload.clone(),
        });
    }

    if trade_mode == TradeMode::InTrade && matches!(verdict, Verdict::Reduce | Verdict::Exit) {
        let label = if verdict == Verdict::Exit {
            "Exit Trade Focus"
        } else {
            "Reduce / Exit Focus"
        };
        actions.push(CoachAction {
            id: ActionId::ExitTradeFocus,
            label: label.to_string(),
            style: next_style(&actions, ActionStyle::Secondary),
            payload,
        });
    }

    actions.push(CoachAction {
        id: ActionId::OpenHistory,
        label: "Open Coach History".to_string(),
        style: next_style(&actions, ActionStyle::Ghost),
        payload: None,
    });

    actions.truncate(MAX_ACTIONS);
    actions
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextFingerprint<'a> {
    setup_id: Option<&'a str>,
    trade_mode: Option<TradeMode>,
    question: Option<&'a str>,
    selected_contract: Option<&'a SelectedContract>,
    message_ids: Vec<&'a str>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// `sha256:<hex>` over the request and the ids of the messages it saw
pub fn build_context_hash(request: &CoachDecisionRequest, messages: &[CoachMessage]) -> String {
    let fingerprint = ContextFingerprint {
        setup_id: request.setup_id.as_deref(),
        trade_mode: request.trade_mode,
        question: request.question.as_deref(),
        selected_contract: request.selected_contract.as_ref(),
        message_ids: messages.iter().map(|m| m.id.as_str()).collect(),
        last_timestamp: messages.first().map(|m| m.timestamp),
    };
    // Plain data, serialization cannot fail
    let payload = serde_json::to_vec(&fingerprint).unwrap_or_default();
    let digest = Sha256::digest(&payload);
    format!("sha256:{}", hex::encode(digest))
}

/// Downgrade ENTER without a setup, with low confidence, or while in a trade
pub fn apply_guardrails(mut brief: CoachDecisionBrief, request: &CoachDecisionRequest) -> CoachDecisionBrief {
    if request.setup_id.is_none() && brief.verdict == Verdict::Enter {
        brief.verdict = Verdict::Wait;
        brief.primary_text = "Select a setup first, then re-evaluate entry timing.".to_string();
    }
    if brief.verdict == Verdict::Enter && brief.confidence < MIN_ENTER_CONFIDENCE {
        brief.verdict = Verdict::Wait;
        brief.primary_text =
            "Confidence is currently too low for entry. Wait for cleaner confirmation.".to_string();
    }
    if request.trade_mode == Some(TradeMode::InTrade) && brief.verdict == Verdict::Enter {
        brief.verdict = Verdict::Wait;
        brief.primary_text =
            "Trade is already active. Manage risk and wait for the next transition.".to_string();
    }
    brief
}

pub fn build_rule_based_decision(
    messages: &[CoachMessage],
    request: &CoachDecisionRequest,
    now: DateTime<Utc>,
) -> CoachDecisionBrief {
    let trade_mode = request.trade_mode.unwrap_or(TradeMode::Scan);
    let verdict = infer_verdict(messages, trade_mode);
    let why = build_why(messages);
    let context_hash = build_context_hash(request, messages);

    let max_risk_dollars = request
        .selected_contract
        .as_ref()
        .map(|contract| {
            (contract.ask * Decimal::from(100))
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        });

    let position_guidance = if verdict == Verdict::Enter {
        "Start with controlled size and add only on confirmation."
    } else {
        "Preserve risk budget until context improves."
    };

    let hash_prefix: String = context_hash
        .trim_start_matches("sha256:")
        .chars()
        .take(12)
        .collect();

    let brief = CoachDecisionBrief {
        decision_id: format!("coach_decision_fallback_{}", hash_prefix),
        setup_id: request.setup_id.clone(),
        verdict,
        confidence: infer_confidence(messages, verdict),
        primary_text: primary_text(verdict, &why),
        why,
        risk_plan: RiskPlan {
            invalidation: None,
            stop: None,
            max_risk_dollars,
            position_guidance: Some(position_guidance.to_string()),
        },
        actions: build_actions(request, trade_mode, verdict),
        severity: infer_severity(messages),
        freshness: Freshness {
            generated_at: now,
            expires_at: now + Duration::milliseconds(DECISION_TTL_MS),
            stale: false,
        },
        context_hash,
        source: DecisionSource::FallbackV1,
    };

    apply_guardrails(brief, request)
}
