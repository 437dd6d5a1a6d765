//! Shared setup fixtures for unit tests

use chrono::{TimeZone, Utc};

use crate::common::types::{
    Direction, EntryZone, Regime, Setup, SetupStatus, SetupType, Target,
};

/// Valid fade setup around 5000; bearish geometry is mirrored
pub fn sample_setup(direction: Direction, status: SetupStatus) -> Setup {
    let (entry_zone, stop, t1, t2) = match direction {
        Direction::Bullish => (EntryZone { low: 5000.0, high: 5002.0 }, 4995.0, 5010.0, 5020.0),
        Direction::Bearish => (EntryZone { low: 4998.0, high: 5000.0 }, 5005.0, 4990.0, 4980.0),
    };
    Setup {
        id: "s1".to_string(),
        setup_type: SetupType::FadeAtWall,
        direction,
        entry_zone,
        stop,
        target1: Target::new(t1, "Target 1"),
        target2: Target::new(t2, "Target 2"),
        confluence_score: 3.0,
        confluence_sources: vec![],
        cluster_zone: None,
        regime: Regime::Ranging,
        status,
        probability: 60.0,
        tier: None,
        assessed_tier: None,
        recommended_contract: None,
        decision_drivers: vec![],
        decision_risks: vec![],
        alignment_score: None,
        confidence: None,
        p_win_calibrated: None,
        ev_r: None,
        confidence_trend: None,
        memory: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 16, 14, 30, 0).unwrap(),
        triggered_at: None,
        status_updated_at: None,
    }
}
