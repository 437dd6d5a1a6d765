//! Rationale enrichment for decision briefs

use chrono::{DateTime, Utc};

use super::types::CoachDecisionBrief;
use crate::common::types::{Direction, Setup};

pub const MAX_DRIVER_LINES: usize = 3;
pub const MAX_RISK_LINES: usize = 3;
pub const MAX_WHY_LINES: usize = 6;

fn freshness_line(brief: &CoachDecisionBrief, now: DateTime<Utc>) -> String {
    if brief.freshness.is_expired(now) {
        return "Decision context is stale. Refresh before acting.".to_string();
    }
    let age_secs = brief.freshness.age_ms(now) / 1000;
    format!("Decision context refreshed {}s ago.", age_secs)
}

fn invalidation_text(setup: &Setup) -> String {
    let side = match setup.direction {
        Direction::Bullish => "below",
        Direction::Bearish => "above",
    };
    format!(
        "Thesis invalidates on a sustained move {} {:.2}.",
        side, setup.stop
    )
}

fn push_unique(lines: &mut Vec<String>, line: String) {
    let line = line.trim().to_string();
    if !line.is_empty() && !lines.contains(&line) {
        lines.push(line);
    }
}

/// Append setup drivers, risks and a freshness line to `why`
///
/// Existing lines stay first. The freshness line always survives the cap.
/// A missing stop or invalidation is backfilled from the setup geometry.
pub fn apply_explainability(
    brief: &CoachDecisionBrief,
    setup: Option<&Setup>,
    now: DateTime<Utc>,
) -> CoachDecisionBrief {
    let mut next = brief.clone();
    let mut why: Vec<String> = Vec::with_capacity(MAX_WHY_LINES);
    for line in &brief.why {
        push_unique(&mut why, line.clone());
    }

    if let Some(setup) = setup {
        for driver in setup.decision_drivers.iter().take(MAX_DRIVER_LINES) {
            push_unique(&mut why, format!("Driver: {}", driver));
        }
        for risk in setup.decision_risks.iter().take(MAX_RISK_LINES) {
            push_unique(&mut why, format!("Risk: {}", risk));
        }

        if next.risk_plan.stop.is_none() {
            next.risk_plan.stop = Some(setup.stop);
        }
        if next.risk_plan.invalidation.is_none() {
            next.risk_plan.invalidation = Some(invalidation_text(setup));
        }
    } else if next.risk_plan.invalidation.is_none() {
        next.risk_plan.invalidation =
            Some("No setup in scope. Define a stop before committing risk.".to_string());
    }

    why.truncate(MAX_WHY_LINES - 1);
    push_unique(&mut why, freshness_line(brief, now));
    next.why = why;
    next.freshness.stale = brief.freshness.is_expired(now);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::types::{DecisionSource, Freshness, RiskPlan, Severity, Verdict};
    use crate::common::types::SetupStatus;
    use crate::setup::fixtures::sample_setup;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn brief(why: Vec<&str>) -> CoachDecisionBrief {
        let at = Utc.with_ymd_and_hms(2026, 3, 16, 14, 30, 0).unwrap();
        CoachDecisionBrief {
            decision_id: "d1".to_string(),
            setup_id: Some("setup-bull".to_string()),
            verdict: Verdict::Wait,
            confidence: 62,
            primary_text: "Wait".to_string(),
            why: why.into_iter().map(String::from).collect(),
            risk_plan: RiskPlan::default(),
            actions: vec![],
            severity: Severity::Routine,
            freshness: Freshness {
                generated_at: at,
                expires_at: at + Duration::seconds(60),
                stale: false,
            },
            context_hash: "sha256:abc".to_string(),
            source: DecisionSource::FallbackV1,
        }
    }

    #[test]
    fn test_appends_drivers_risks_and_freshness() {
        let mut setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        setup.decision_drivers = vec!["Flow confirms".into(), "Fortress zone".into()];
        setup.decision_risks = vec!["Regime conflict".into()];
        let input = brief(vec!["Entry window open"]);
        let now = input.freshness.generated_at + Duration::seconds(12);

        let out = apply_explainability(&input, Some(&setup), now);

        assert_eq!(
            out.why,
            vec![
                "Entry window open".to_string(),
                "Driver: Flow confirms".to_string(),
                "Driver: Fortress zone".to_string(),
                "Risk: Regime conflict".to_string(),
                "Decision context refreshed 12s ago.".to_string(),
            ]
        );
        assert_eq!(out.risk_plan.stop, Some(4995.0));
        assert_eq!(
            out.risk_plan.invalidation.as_deref(),
            Some("Thesis invalidates on a sustained move below 4995.00.")
        );
    }

    #[test]
    fn test_caps_at_six_and_keeps_freshness() {
        let mut setup = sample_setup(Direction::Bearish, SetupStatus::Ready);
        setup.decision_drivers = vec!["d1".into(), "d2".into(), "d3".into(), "d4".into()];
        setup.decision_risks = vec!["r1".into(), "r2".into(), "r3".into()];
        let input = brief(vec!["a", "b"]);
        let now = input.freshness.expires_at + Duration::seconds(1);

        let out = apply_explainability(&input, Some(&setup), now);

        assert_eq!(out.why.len(), MAX_WHY_LINES);
        assert_eq!(out.why.last().unwrap(), "Decision context is stale. Refresh before acting.");
        assert!(!out.why.iter().any(|l| l == "Driver: d4"));
        assert!(out.freshness.stale);
    }

    #[test]
    fn test_existing_plan_is_kept() {
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let mut input = brief(vec![]);
        input.risk_plan.stop = Some(4990.0);
        input.risk_plan.invalidation = Some("custom".to_string());

        let out = apply_explainability(&input, Some(&setup), input.freshness.generated_at);
        assert_eq!(out.risk_plan.stop, Some(4990.0));
        assert_eq!(out.risk_plan.invalidation.as_deref(), Some("custom"));
    }

    #[test]
    fn test_duplicate_lines_collapse() {
        let mut setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        setup.decision_drivers = vec!["same".into(), "same".into()];
        let input = brief(vec!["Driver: same"]);

        let out = apply_explainability(&input, Some(&setup), input.freshness.generated_at);
        assert_eq!(out.why.len(), 2);
    }
}
