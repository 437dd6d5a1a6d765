//! Setup lifecycle transitions
//!
//! forming -> ready -> triggered -> {resolved_target, resolved_stop, expired}.
//! Every transition moves the status rank forward; nothing here regresses a
//! setup.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::viability::{stop_hit, target1_reached};
use crate::common::types::{Setup, SetupStatus, SetupType};
use crate::ml::tier::tier_thresholds;

/// Confluence needed before a forming setup can be promoted
pub const READY_MIN_CONFLUENCE: f64 = 3.0;

/// Pre-trigger setups older than this expire
pub const PRE_TRIGGER_TTL_MINUTES: i64 = 30;

/// Calibrated win probability a setup type needs before it is promoted
pub fn watchlist_threshold(setup_type: SetupType) -> f64 {
    tier_thresholds(setup_type).watchlist
}

/// Calibrated win probability as a fraction, else the raw probability
pub fn win_probability(setup: &Setup) -> f64 {
    setup
        .p_win_calibrated
        .unwrap_or(setup.probability / 100.0)
        .clamp(0.0, 1.0)
}

pub fn meets_ready_thresholds(setup: &Setup) -> bool {
    setup.confluence_score >= READY_MIN_CONFLUENCE
        && win_probability(setup) >= watchlist_threshold(setup.setup_type)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub setup_id: String,
    pub from: SetupStatus,
    pub to: SetupStatus,
    pub at: DateTime<Utc>,
}

/// Status to keep when two copies of one setup meet
///
/// The higher rank wins; between two terminal states the existing one stays.
pub fn merge_status(existing: SetupStatus, incoming: SetupStatus) -> SetupStatus {
    if existing.is_terminal() || incoming.rank() <= existing.rank() {
        existing
    } else {
        incoming
    }
}

fn apply(setup: &mut Setup, to: SetupStatus, now: DateTime<Utc>) -> StatusTransition {
    let from = setup.status;
    setup.status = to;
    setup.status_updated_at = Some(now);
    if to == SetupStatus::Triggered {
        setup.triggered_at = Some(now);
    }
    debug!(setup_id = %setup.id, %from, %to, "Setup transition");
    StatusTransition {
        setup_id: setup.id.clone(),
        from,
        to,
        at: now,
    }
}

/// Advance one setup against the latest price
///
/// Promotion and triggering may happen in the same pass. Returns every
/// transition taken, oldest first.
pub fn advance_setup(
    setup: &mut Setup,
    price: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<StatusTransition> {
    let mut transitions = Vec::new();
    if setup.status.is_terminal() {
        return transitions;
    }

    if setup.status.is_pre_trigger()
        && now - setup.created_at > Duration::minutes(PRE_TRIGGER_TTL_MINUTES)
    {
        transitions.push(apply(setup, SetupStatus::Expired, now));
        return transitions;
    }

    if setup.status == SetupStatus::Forming && meets_ready_thresholds(setup) {
        transitions.push(apply(setup, SetupStatus::Ready, now));
    }

    let Some(price) = price.filter(|p| p.is_finite()) else {
        return transitions;
    };

    if setup.status == SetupStatus::Ready && setup.entry_zone.contains(price) {
        transitions.push(apply(setup, SetupStatus::Triggered, now));
    }

    if setup.status == SetupStatus::Triggered {
        if stop_hit(setup, price) {
            transitions.push(apply(setup, SetupStatus::ResolvedStop, now));
        } else if target1_reached(setup, price) {
            transitions.push(apply(setup, SetupStatus::ResolvedTarget, now));
        }
    }

    transitions
}

/// Expire a non-terminal setup at the session close
pub fn expire_at_session_end(setup: &mut Setup, now: DateTime<Utc>) -> Option<StatusTransition> {
    if setup.status.is_terminal() {
        return None;
    }
    Some(apply(setup, SetupStatus::Expired, now))
}
