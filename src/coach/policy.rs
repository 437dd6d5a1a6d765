//! Trade-mode scoping for coach decisions
//!
//! A brief produced for one mode can be shown in another. ENTER is only
//! shown while evaluating a setup and EXIT only while in a trade; action
//! buttons are filtered and injected to match.

use std::borrow::Cow;

use serde_json::json;

use super::types::{ActionId, ActionStyle, CoachAction, CoachDecisionBrief, Verdict};
use crate::common::types::TradeMode;

pub const SCAN_ENTER_TEXT: &str = "Select an actionable setup before entering. Keep scanning for confirmation.";
pub const IN_TRADE_ENTER_TEXT: &str = "Trade is already active. Manage risk and wait for the next transition.";
pub const NO_POSITION_EXIT_TEXT: &str = "No active trade. Exit guidance applies once a position is open.";

const MAX_ACTIONS: usize = 3;

/// Changes a mode applies to a brief
#[derive(Debug, Default)]
struct ModePlan {
    verdict: Option<(Verdict, &'static str)>,
    dropped: Vec<usize>,
    injected: Option<CoachAction>,
}

impl ModePlan {
    fn is_empty(&self) -> bool {
        self.verdict.is_none() && self.dropped.is_empty() && self.injected.is_none()
    }
}

fn action_allowed(action: &CoachAction, mode: TradeMode, scoped_setup_id: Option<&str>) -> bool {
    let mode_ok = match action.id {
        ActionId::EnterTradeFocus => mode == TradeMode::Evaluate,
        ActionId::ExitTradeFocus
        | ActionId::TightenStopGuidance
        | ActionId::ReduceSizeGuidance => mode == TradeMode::InTrade,
        ActionId::RevertAiContract => mode != TradeMode::InTrade,
        ActionId::AskFollowUp | ActionId::OpenHistory => true,
    };
    let scope_ok = match (action.payload_setup_id(), scoped_setup_id) {
        (Some(target), Some(scoped)) => target == scoped,
        _ => true,
    };
    mode_ok && scope_ok
}

fn plan_for_mode(
    brief: &CoachDecisionBrief,
    mode: TradeMode,
    scoped_setup_id: Option<&str>,
) -> ModePlan {
    let verdict = match (mode, brief.verdict) {
        (TradeMode::Scan, Verdict::Enter) => Some((Verdict::Wait, SCAN_ENTER_TEXT)),
        (TradeMode::InTrade, Verdict::Enter) => Some((Verdict::Wait, IN_TRADE_ENTER_TEXT)),
        (TradeMode::Scan | TradeMode::Evaluate, Verdict::Exit) => {
            Some((Verdict::Wait, NO_POSITION_EXIT_TEXT))
        }
        _ => None,
    };
    let effective = verdict.map_or(brief.verdict, |(v, _)| v);

    let dropped: Vec<usize> = brief
        .actions
        .iter()
        .enumerate()
        .filter(|(_, action)| !action_allowed(action, mode, scoped_setup_id))
        .map(|(idx, _)| idx)
        .collect();

    // only actions that survive the filter count as already present
    let has = |id: ActionId| {
        brief
            .actions
            .iter()
            .enumerate()
            .any(|(idx, a)| a.id == id && !dropped.contains(&idx))
    };
    let setup_id = scoped_setup_id.or(brief.setup_id.as_deref());

    let injected = match (mode, effective, setup_id) {
        (TradeMode::Evaluate, Verdict::Enter, Some(id)) if !has(ActionId::EnterTradeFocus) => {
            Some(CoachAction {
                id: ActionId::EnterTradeFocus,
                label: "Enter Trade Focus".to_string(),
                style: ActionStyle::Primary,
                payload: Some(json!({ "setupId": id })),
            })
        }
        (TradeMode::InTrade, Verdict::Reduce | Verdict::Exit, _) if !has(ActionId::ExitTradeFocus) => {
            Some(CoachAction {
                id: ActionId::ExitTradeFocus,
                label: if effective == Verdict::Exit {
                    "Exit Trade Focus".to_string()
                } else {
                    "Reduce / Exit Focus".to_string()
                },
                style: ActionStyle::Primary,
                payload: setup_id.map(|id| json!({ "setupId": id })),
            })
        }
        _ => None,
    };

    ModePlan {
        verdict,
        dropped,
        injected,
    }
}

/// Scope a decision to the trader's mode
///
/// Returns the input by reference when it already fits the mode, so a
/// second application is always a no-op.
pub fn normalize_coach_decision_for_mode<'a>(
    brief: &'a CoachDecisionBrief,
    mode: TradeMode,
    scoped_setup_id: Option<&str>,
) -> Cow<'a, CoachDecisionBrief> {
    let plan = plan_for_mode(brief, mode, scoped_setup_id);
    if plan.is_empty() {
        return Cow::Borrowed(brief);
    }

    let mut next = brief.clone();
    if let Some((verdict, text)) = plan.verdict {
        next.verdict = verdict;
        next.primary_text = text.to_string();
    }

    next.actions = brief
        .actions
        .iter()
        .enumerate()
        .filter(|(idx, _)| !plan.dropped.contains(idx))
        .map(|(_, action)| action.clone())
        .collect();

    if let Some(action) = plan.injected {
        for existing in next.actions.iter_mut() {
            if existing.style == ActionStyle::Primary {
                existing.style = ActionStyle::Secondary;
            }
        }
        next.actions.insert(0, action);
    }
    next.actions.truncate(MAX_ACTIONS);

    Cow::Owned(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::types::{DecisionSource, Freshness, RiskPlan, Severity};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn action(id: ActionId, style: ActionStyle, setup_id: Option<&str>) -> CoachAction {
        CoachAction {
            id,
            label: format!("{:?}", id),
            style,
            payload: setup_id.map(|s| json!({ "setupId": s })),
        }
    }

    fn brief(verdict: Verdict, actions: Vec<CoachAction>) -> CoachDecisionBrief {
        let at = Utc.with_ymd_and_hms(2026, 3, 16, 14, 30, 0).unwrap();
        CoachDecisionBrief {
            decision_id: "d1".to_string(),
            setup_id: Some("s1".to_string()),
            verdict,
            confidence: 72,
            primary_text: "original".to_string(),
            why: vec!["Entry window open".to_string()],
            risk_plan: RiskPlan::default(),
            actions,
            severity: Severity::Routine,
            freshness: Freshness {
                generated_at: at,
                expires_at: at + chrono::Duration::seconds(60),
                stale: false,
            },
            context_hash: "sha256:abc".to_string(),
            source: DecisionSource::FallbackV1,
        }
    }

    #[test]
    fn test_enter_downgraded_in_scan() {
        let input = brief(
            Verdict::Enter,
            vec![
                action(ActionId::EnterTradeFocus, ActionStyle::Primary, Some("s1")),
                action(ActionId::OpenHistory, ActionStyle::Ghost, None),
            ],
        );
        let out = normalize_coach_decision_for_mode(&input, TradeMode::Scan, None);

        assert_eq!(out.verdict, Verdict::Wait);
        assert_eq!(out.primary_text, SCAN_ENTER_TEXT);
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].id, ActionId::OpenHistory);
    }

    #[test]
    fn test_enter_downgraded_in_trade() {
        let input = brief(Verdict::Enter, vec![]);
        let out = normalize_coach_decision_for_mode(&input, TradeMode::InTrade, Some("s1"));
        assert_eq!(out.verdict, Verdict::Wait);
        assert_eq!(out.primary_text, IN_TRADE_ENTER_TEXT);
    }

    #[test]
    fn test_exit_only_in_trade() {
        let input = brief(
            Verdict::Exit,
            vec![action(ActionId::ExitTradeFocus, ActionStyle::Primary, Some("s1"))],
        );

        let evaluate = normalize_coach_decision_for_mode(&input, TradeMode::Evaluate, Some("s1"));
        assert_eq!(evaluate.verdict, Verdict::Wait);
        assert!(evaluate.actions.is_empty());

        let in_trade = normalize_coach_decision_for_mode(&input, TradeMode::InTrade, Some("s1"));
        assert!(matches!(in_trade, Cow::Borrowed(_)));
        assert_eq!(in_trade.verdict, Verdict::Exit);
    }

    #[test]
    fn test_enter_focus_injected_when_evaluating() {
        let input = brief(
            Verdict::Enter,
            vec![
                action(ActionId::RevertAiContract, ActionStyle::Primary, Some("s1")),
                action(ActionId::OpenHistory, ActionStyle::Ghost, None),
            ],
        );
        let out = normalize_coach_decision_for_mode(&input, TradeMode::Evaluate, Some("s1"));

        let ids: Vec<ActionId> = out.actions.iter().map(|a| a.id).collect();
        assert_eq!(
            ids,
            vec![ActionId::EnterTradeFocus, ActionId::RevertAiContract, ActionId::OpenHistory]
        );
        assert_eq!(out.actions[0].style, ActionStyle::Primary);
        assert_eq!(out.actions[1].style, ActionStyle::Secondary);
    }

    #[test]
    fn test_exit_focus_injected_for_reduce_in_trade() {
        let input = brief(
            Verdict::Reduce,
            vec![action(ActionId::RevertAiContract, ActionStyle::Primary, Some("s1"))],
        );
        let out = normalize_coach_decision_for_mode(&input, TradeMode::InTrade, Some("s1"));

        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].id, ActionId::ExitTradeFocus);
        assert_eq!(out.actions[0].label, "Reduce / Exit Focus");
    }

    #[test]
    fn test_actions_for_other_setups_are_dropped() {
        let input = brief(
            Verdict::Wait,
            vec![
                action(ActionId::RevertAiContract, ActionStyle::Primary, Some("other")),
                action(ActionId::OpenHistory, ActionStyle::Ghost, None),
            ],
        );
        let out = normalize_coach_decision_for_mode(&input, TradeMode::Evaluate, Some("s1"));
        assert_eq!(out.actions.len(), 1);
    }

    #[test]
    fn test_dropped_enter_focus_is_replaced_for_scope() {
        let input = brief(
            Verdict::Enter,
            vec![action(ActionId::EnterTradeFocus, ActionStyle::Primary, Some("s1"))],
        );
        let once = normalize_coach_decision_for_mode(&input, TradeMode::Evaluate, Some("s2")).into_owned();
        assert_eq!(once.actions.len(), 1);
        assert_eq!(once.actions[0].id, ActionId::EnterTradeFocus);
        assert_eq!(once.actions[0].payload_setup_id(), Some("s2"));

        let twice = normalize_coach_decision_for_mode(&once, TradeMode::Evaluate, Some("s2"));
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(*twice, once);
    }

    #[test]
    fn test_idempotent_in_every_mode() {
        let inputs = vec![
            brief(
                Verdict::Enter,
                vec![
                    action(ActionId::EnterTradeFocus, ActionStyle::Primary, Some("s1")),
                    action(ActionId::RevertAiContract, ActionStyle::Secondary, Some("s1")),
                    action(ActionId::OpenHistory, ActionStyle::Ghost, None),
                ],
            ),
            brief(Verdict::Exit, vec![action(ActionId::OpenHistory, ActionStyle::Primary, None)]),
            brief(Verdict::Reduce, vec![]),
            brief(Verdict::Wait, vec![action(ActionId::TightenStopGuidance, ActionStyle::Primary, None)]),
        ];

        for input in &inputs {
            for mode in [TradeMode::Scan, TradeMode::Evaluate, TradeMode::InTrade] {
                let once = normalize_coach_decision_for_mode(input, mode, Some("s1")).into_owned();
                let twice = normalize_coach_decision_for_mode(&once, mode, Some("s1"));
                assert!(matches!(twice, Cow::Borrowed(_)), "mode {} not idempotent", mode);
                assert_eq!(*twice, once);
            }
        }
    }
}
