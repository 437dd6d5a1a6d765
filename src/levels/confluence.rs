//! Confluence scoring
//!
//! Each flag is evaluated independently; the score is the number that fired.

use serde::{Deserialize, Serialize};

use super::regime::regime_compatibility;
use crate::common::types::{ClusterZone, Direction, LevelCategory, Setup, ZoneType};
use crate::market::context::MarketContext;

pub const MAX_CONFLUENCE_SCORE: f64 = 5.0;

/// Flow prints considered when checking flow confirmation
pub const FLOW_CONFIRMATION_WINDOW: usize = 24;
pub const FLOW_CONFIRMATION_MIN_BIAS: f64 = 0.15;
pub const REGIME_ALIGNMENT_MIN_COMPAT: f64 = 0.65;

pub const SOURCE_LEVEL_QUALITY: &str = "level_quality";
pub const SOURCE_GEX_ALIGNMENT: &str = "gex_alignment";
pub const SOURCE_FLOW_CONFIRMATION: &str = "flow_confirmation";
pub const SOURCE_FIBONACCI_TOUCH: &str = "fibonacci_touch";
pub const SOURCE_REGIME_ALIGNMENT: &str = "regime_alignment";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfluenceInput {
    pub zone_type: Option<ZoneType>,
    pub gex_aligned: bool,
    pub flow_confirmed: bool,
    pub fib_touch: bool,
    pub regime_aligned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub score: f64,
    pub sources: Vec<String>,
}

pub fn calculate_confluence(input: &ConfluenceInput) -> ConfluenceResult {
    let flags = [
        (
            matches!(input.zone_type, Some(ZoneType::Fortress | ZoneType::Defended)),
            SOURCE_LEVEL_QUALITY,
        ),
        (input.gex_aligned, SOURCE_GEX_ALIGNMENT),
        (input.flow_confirmed, SOURCE_FLOW_CONFIRMATION),
        (input.fib_touch, SOURCE_FIBONACCI_TOUCH),
        (input.regime_aligned, SOURCE_REGIME_ALIGNMENT),
    ];

    let sources: Vec<String> = flags
        .iter()
        .filter(|(fired, _)| *fired)
        .map(|(_, name)| name.to_string())
        .collect();

    ConfluenceResult {
        score: (sources.len() as f64).min(MAX_CONFLUENCE_SCORE),
        sources,
    }
}

/// Bonus for a level whose history favors this setup, in [0, 1]
///
/// `win_rate` is a fraction. Returns 0 unless the sample is large enough and
/// the regime fits.
pub fn memory_edge_bonus(win_rate: f64, total_tests: u32, regime_compatibility: f64) -> f64 {
    if !(win_rate >= 0.55 && total_tests >= 5 && regime_compatibility >= 0.65) {
        return 0.0;
    }
    let bonus = ((win_rate - 0.5) * 2.0).min(1.0);
    (bonus * 10_000.0).round() / 10_000.0
}

/// Unweighted share of aligned minus opposing prints, in [-1, 1]
pub fn flow_alignment_bias(ctx: &MarketContext, direction: Direction, window: usize) -> f64 {
    let mut aligned = 0usize;
    let mut total = 0usize;
    for event in ctx.recent_flow(window) {
        total += 1;
        if event.direction == direction {
            aligned += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    let opposing = total - aligned;
    (aligned as f64 - opposing as f64) / total as f64
}

/// Net GEX supports the direction: positive for longs, negative for shorts
pub fn gex_aligned(net_gex: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => net_gex >= 0.0,
        Direction::Bearish => net_gex <= 0.0,
    }
}

fn zone_has_fibonacci(zone: &ClusterZone) -> bool {
    zone.sources
        .iter()
        .any(|s| s.category == LevelCategory::Fibonacci)
}

/// Derive the confluence flags for a setup from the live context
pub fn confluence_input_for(setup: &Setup, ctx: &MarketContext) -> ConfluenceInput {
    let zone = setup.cluster_zone.as_ref();
    ConfluenceInput {
        zone_type: zone.map(|z| z.zone_type),
        gex_aligned: ctx
            .gex
            .as_ref()
            .is_some_and(|g| gex_aligned(g.net_gex, setup.direction)),
        flow_confirmed: flow_alignment_bias(ctx, setup.direction, FLOW_CONFIRMATION_WINDOW)
            >= FLOW_CONFIRMATION_MIN_BIAS,
        fib_touch: zone.is_some_and(zone_has_fibonacci),
        regime_aligned: regime_compatibility(setup.regime, ctx.regime)
            >= REGIME_ALIGNMENT_MIN_COMPAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_edge_bonus() {
        assert_eq!(memory_edge_bonus(0.6, 10, 0.8), 0.2);
        assert_eq!(memory_edge_bonus(0.5, 10, 0.8), 0.0);
        assert_eq!(memory_edge_bonus(0.9, 4, 0.8), 0.0);
        assert_eq!(memory_edge_bonus(0.9, 10, 0.5), 0.0);
        assert_eq!(memory_edge_bonus(1.0, 10, 1.0), 1.0);
    }

    #[test]
    fn test_sources_follow_fixed_order() {
        let input = ConfluenceInput {
            zone_type: Some(ZoneType::Fortress),
            gex_aligned: false,
            flow_confirmed: true,
            fib_touch: false,
            regime_aligned: true,
        };
        let result = calculate_confluence(&input);
        assert_eq!(result.score, 3.0);
        assert_eq!(
            result.sources,
            vec!["level_quality", "flow_confirmation", "regime_alignment"]
        );
    }

    #[test]
    fn test_moderate_zone_is_not_quality() {
        let input = ConfluenceInput {
            zone_type: Some(ZoneType::Moderate),
            ..Default::default()
        };
        assert_eq!(calculate_confluence(&input).score, 0.0);
    }

    #[test]
    fn test_all_flags_cap_at_five() {
        let input = ConfluenceInput {
            zone_type: Some(ZoneType::Defended),
            gex_aligned: true,
            flow_confirmed: true,
            fib_touch: true,
            regime_aligned: true,
        };
        assert_eq!(calculate_confluence(&input).score, MAX_CONFLUENCE_SCORE);
    }

    #[test]
    fn test_gex_alignment_by_direction() {
        assert!(gex_aligned(1.0, Direction::Bullish));
        assert!(!gex_aligned(-1.0, Direction::Bullish));
        assert!(gex_aligned(-1.0, Direction::Bearish));
    }
}
