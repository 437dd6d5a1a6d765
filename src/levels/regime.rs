//! Regime classification and setup/regime compatibility

use serde::{Deserialize, Serialize};

use crate::common::types::Regime;

/// Compatibility returned when no active regime is known
pub const UNKNOWN_REGIME_COMPATIBILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Rising,
    Flat,
    Falling,
}

/// Inputs to [`classify_regime`]; ratios are fractions in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeSignals {
    pub net_gex: f64,
    pub volume_trend: VolumeTrend,
    pub range_compression: f64,
    pub breakout_strength: f64,
    pub zone_containment: f64,
}

pub fn classify_regime(signals: &RegimeSignals) -> Regime {
    let rising = signals.volume_trend == VolumeTrend::Rising;

    if signals.breakout_strength >= 0.7 && rising {
        return Regime::Breakout;
    }
    if signals.range_compression >= 0.65 && !rising {
        return Regime::Compression;
    }
    if signals.net_gex < 0.0 && (signals.breakout_strength >= 0.45 || rising) {
        return Regime::Trending;
    }
    if signals.zone_containment >= 0.55 && signals.net_gex >= 0.0 {
        return Regime::Ranging;
    }

    if signals.net_gex < 0.0 {
        Regime::Trending
    } else {
        Regime::Ranging
    }
}

/// How well a setup's regime fits the active one, in [0, 1]
pub fn regime_compatibility(setup_regime: Regime, active: Option<Regime>) -> f64 {
    use Regime::*;

    let Some(active) = active else {
        return UNKNOWN_REGIME_COMPATIBILITY;
    };
    if setup_regime == active {
        return 1.0;
    }
    match (setup_regime, active) {
        (Trending, Breakout) | (Breakout, Trending) => 0.65,
        (Compression, Ranging) | (Ranging, Compression) => 0.65,
        (Trending, Ranging) | (Ranging, Trending) => 0.15,
        (Breakout, Compression) | (Compression, Breakout) => 0.15,
        _ => 0.3,
    }
}
