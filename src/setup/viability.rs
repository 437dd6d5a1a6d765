//! Setup geometry checks and trade-mode derivation

use crate::common::types::{Direction, Setup, SetupStatus, TradeMode};

/// Direction-implied target1 already reached by `price`
pub fn target1_reached(setup: &Setup, price: f64) -> bool {
    match setup.direction {
        Direction::Bullish => price >= setup.target1.price,
        Direction::Bearish => price <= setup.target1.price,
    }
}

/// Direction-implied stop hit by `price`
pub fn stop_hit(setup: &Setup, price: f64) -> bool {
    match setup.direction {
        Direction::Bullish => price <= setup.stop,
        Direction::Bearish => price >= setup.stop,
    }
}

/// A forming/ready setup whose target1 is already behind price
///
/// Such setups are withheld from presentation; triggered setups are never in
/// conflict.
pub fn has_progression_conflict(setup: &Setup, price: f64) -> bool {
    price.is_finite() && setup.status.is_pre_trigger() && target1_reached(setup, price)
}

/// Stop, entry and targets are finite and ordered for the direction
pub fn has_valid_geometry(setup: &Setup) -> bool {
    let entry = &setup.entry_zone;
    let values = [
        entry.low,
        entry.high,
        setup.stop,
        setup.target1.price,
        setup.target2.price,
    ];
    if values.iter().any(|v| !v.is_finite()) || entry.low > entry.high {
        return false;
    }

    match setup.direction {
        Direction::Bullish => {
            setup.stop < entry.low
                && setup.target1.price > entry.high
                && setup.target2.price >= setup.target1.price
        }
        Direction::Bearish => {
            setup.stop > entry.high
                && setup.target1.price < entry.low
                && setup.target2.price <= setup.target1.price
        }
    }
}

/// Trade mode from the feature flag, the trader's mode and the selected setup
///
/// `None` when trade-mode scoping is disabled.
pub fn derive_trade_mode(
    flag_enabled: bool,
    current_mode: TradeMode,
    selected_status: Option<SetupStatus>,
) -> Option<TradeMode> {
    if !flag_enabled {
        return None;
    }
    if current_mode == TradeMode::InTrade {
        return Some(TradeMode::InTrade);
    }
    if selected_status.is_some_and(|s| s.is_actionable()) {
        return Some(TradeMode::Evaluate);
    }
    Some(TradeMode::Scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::EntryZone;
    use crate::setup::fixtures::sample_setup;

    fn bullish(status: SetupStatus) -> Setup {
        sample_setup(Direction::Bullish, status)
    }

    #[test]
    fn test_pre_trigger_with_target_reached_conflicts() {
        assert!(has_progression_conflict(&bullish(SetupStatus::Ready), 5010.0));
        assert!(has_progression_conflict(&bullish(SetupStatus::Forming), 5012.0));
        assert!(!has_progression_conflict(&bullish(SetupStatus::Ready), 5009.0));
    }

    #[test]
    fn test_triggered_never_conflicts() {
        assert!(!has_progression_conflict(&bullish(SetupStatus::Triggered), 5015.0));
    }

    #[test]
    fn test_bearish_conflict_mirrors() {
        let mut setup = bullish(SetupStatus::Ready);
        setup.direction = Direction::Bearish;
        setup.stop = 5008.0;
        setup.target1.price = 4990.0;
        setup.target2.price = 4980.0;
        assert!(has_valid_geometry(&setup));
        assert!(has_progression_conflict(&setup, 4989.0));
        assert!(!has_progression_conflict(&setup, 4995.0));
    }

    #[test]
    fn test_geometry_checks() {
        assert!(has_valid_geometry(&bullish(SetupStatus::Forming)));

        let mut stop_inside = bullish(SetupStatus::Forming);
        stop_inside.stop = 5001.0;
        assert!(!has_valid_geometry(&stop_inside));

        let mut nan = bullish(SetupStatus::Forming);
        nan.target2.price = f64::NAN;
        assert!(!has_valid_geometry(&nan));

        let mut inverted = bullish(SetupStatus::Forming);
        inverted.entry_zone = EntryZone { low: 5003.0, high: 5001.0 };
        assert!(!has_valid_geometry(&inverted));
    }

    #[test]
    fn test_trade_mode_derivation() {
        assert_eq!(derive_trade_mode(false, TradeMode::InTrade, None), None);
        assert_eq!(
            derive_trade_mode(true, TradeMode::InTrade, Some(SetupStatus::Forming)),
            Some(TradeMode::InTrade)
        );
        assert_eq!(
            derive_trade_mode(true, TradeMode::Scan, Some(SetupStatus::Ready)),
            Some(TradeMode::Evaluate)
        );
        assert_eq!(
            derive_trade_mode(true, TradeMode::Evaluate, Some(SetupStatus::Expired)),
            Some(TradeMode::Scan)
        );
        assert_eq!(derive_trade_mode(true, TradeMode::Scan, None), Some(TradeMode::Scan));
    }
}
