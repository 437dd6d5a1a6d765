//! Option contract selection
//!
//! Filters a chain to liquid contracts of the direction-implied type inside
//! the setup's delta band, translates the setup's point-space risk/reward into
//! premium space and picks the best candidate. The strict band is tried
//! first; the relaxed band only when nothing strict survives.

use std::cmp::Ordering;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::types::{
    ContractRecommendation, OptionContract, Regime, Setup, SetupType,
};
use crate::config::types::ContractConfig;

const MAX_DELTA_STRICT: f64 = 0.65;
const MAX_DELTA_RELAXED: f64 = 0.80;
/// Theta charged against the position, as a fraction of a day
const THETA_HOLD_DAYS: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaBandKind {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaBand {
    pub min: f64,
    pub max: f64,
}

impl DeltaBand {
    pub fn contains(&self, delta: f64) -> bool {
        delta >= self.min && delta <= self.max
    }
}

/// Ideal absolute delta for a setup, adjusted for the regime
pub fn delta_target_for_setup(setup_type: SetupType, regime: Regime) -> f64 {
    let base: f64 = match setup_type {
        SetupType::OrbBreakout => 0.32,
        SetupType::BreakoutVacuum => 0.28,
        SetupType::TrendContinuation => 0.3,
        SetupType::TrendPullback => 0.26,
        SetupType::FlipReclaim => 0.24,
        SetupType::MeanReversion => 0.22,
        _ => 0.18,
    };

    let momentum_type = matches!(
        setup_type,
        SetupType::OrbBreakout | SetupType::BreakoutVacuum | SetupType::TrendContinuation
    );
    let adjusted = match regime {
        Regime::Ranging | Regime::Compression => base + 0.06,
        Regime::Breakout | Regime::Trending if momentum_type => base - 0.04,
        Regime::Trending if setup_type == SetupType::TrendPullback => base - 0.02,
        _ => base,
    };
    adjusted.clamp(0.12, 0.55)
}

pub fn delta_band_for_setup(setup_type: SetupType, regime: Regime, kind: DeltaBandKind) -> DeltaBand {
    let target = delta_target_for_setup(setup_type, regime);
    let (tolerance, floor, cap) = match kind {
        DeltaBandKind::Relaxed => (0.22, 0.02, MAX_DELTA_RELAXED),
        DeltaBandKind::Strict => {
            let tolerance = if matches!(regime, Regime::Breakout | Regime::Trending) {
                0.12
            } else {
                0.14
            };
            (tolerance, 0.05, MAX_DELTA_STRICT)
        }
    };
    let min = (target - tolerance).clamp(floor, cap);
    let max = (target + tolerance).clamp(cap.min(min + 0.02), cap);
    DeltaBand { min, max }
}

/// 0-100 blend of spread tightness, open interest and volume
pub fn liquidity_score(contract: &OptionContract) -> f64 {
    let spread_score = contract
        .spread_pct()
        .map_or(0.0, |pct| (100.0 - pct * 180.0).clamp(0.0, 100.0));
    let oi_score = ((contract.open_interest as f64 + 1.0).log10() * 22.0).clamp(0.0, 100.0);
    let volume_score = ((contract.volume as f64 + 1.0).log10() * 24.0).clamp(0.0, 100.0);
    let score = spread_score * 0.55 + oi_score * 0.25 + volume_score * 0.20;
    (score * 10.0).round() / 10.0
}

/// Premium-space outcome of holding a contract through the setup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PremiumProjection {
    pub gain_at_target1: f64,
    pub loss_at_stop: f64,
    pub spread_cost: f64,
    pub risk_reward: f64,
}

/// Delta plus gamma convexity, less theta drag and the round-trip spread
pub fn project_premium(setup: &Setup, contract: &OptionContract) -> PremiumProjection {
    let entry = setup.entry_mid();
    let move_t1 = (setup.target1.price - entry).abs();
    let move_stop = (entry - setup.stop).abs();
    let delta = contract.delta.abs();
    let gamma = contract.gamma.abs();
    let theta_drag = contract.theta.abs() * THETA_HOLD_DAYS;
    let mid = contract.mid().to_f64().unwrap_or(0.0);
    let spread_cost = contract.spread().to_f64().unwrap_or(0.0);

    let gain = delta * move_t1 + 0.5 * gamma * move_t1 * move_t1 - theta_drag;
    let loss = (delta * move_stop - 0.5 * gamma * move_stop * move_stop + theta_drag)
        .max(0.0)
        .min(mid);
    let denominator = loss + spread_cost;
    let risk_reward = if denominator > 0.0 {
        ((gain - spread_cost) / denominator).max(0.0)
    } else {
        0.0
    };

    PremiumProjection {
        gain_at_target1: gain,
        loss_at_stop: loss,
        spread_cost,
        risk_reward,
    }
}

fn passes_liquidity(contract: &OptionContract, limits: &ContractConfig) -> bool {
    contract.open_interest >= limits.min_open_interest
        && contract.volume >= limits.min_volume
        && contract
            .spread_pct()
            .is_some_and(|pct| pct <= limits.max_spread_pct)
}

fn eligible<'a>(
    setup: &Setup,
    chain: &'a [OptionContract],
    limits: &ContractConfig,
    kind: DeltaBandKind,
) -> Vec<&'a OptionContract> {
    let wanted = setup.direction.option_type();
    let band = delta_band_for_setup(setup.setup_type, setup.regime, kind);
    let max_risk = match kind {
        DeltaBandKind::Strict => limits.max_contract_risk_strict,
        DeltaBandKind::Relaxed => limits.max_contract_risk_relaxed,
    };
    let multiplier = Decimal::from(limits.multiplier);

    chain
        .iter()
        .filter(|c| c.option_type == wanted)
        .filter(|c| c.bid > Decimal::ZERO && c.ask > c.bid)
        .filter(|c| c.delta.is_finite() && band.contains(c.delta.abs()))
        .filter(|c| passes_liquidity(c, limits))
        .filter(|c| c.ask * multiplier <= max_risk)
        .collect()
}

fn compare_candidates(
    a: (&OptionContract, &PremiumProjection),
    b: (&OptionContract, &PremiumProjection),
    target_delta: f64,
) -> Ordering {
    let by_rr = a.1.risk_reward.total_cmp(&b.1.risk_reward);
    let by_delta = (b.0.delta.abs() - target_delta)
        .abs()
        .total_cmp(&(a.0.delta.abs() - target_delta).abs());
    let by_spread = b.0.spread().cmp(&a.0.spread());
    by_rr.then(by_delta).then(by_spread)
}

/// Best contract for a setup, or `None` when nothing is eligible
pub fn recommend_contract(
    setup: &Setup,
    chain: &[OptionContract],
    limits: &ContractConfig,
) -> Option<ContractRecommendation> {
    let (kind, candidates) = [DeltaBandKind::Strict, DeltaBandKind::Relaxed]
        .into_iter()
        .map(|kind| (kind, eligible(setup, chain, limits, kind)))
        .find(|(_, candidates)| !candidates.is_empty())?;

    if kind == DeltaBandKind::Relaxed {
        info!(setup_id = %setup.id, "No strict-band contract; using relaxed delta band");
    }

    let target_delta = delta_target_for_setup(setup.setup_type, setup.regime);
    let (contract, projection) = candidates
        .into_iter()
        .map(|c| (c, project_premium(setup, c)))
        .max_by(|a, b| compare_candidates((a.0, &a.1), (b.0, &b.1), target_delta))?;

    debug!(
        setup_id = %setup.id,
        contract = %contract.description(),
        risk_reward = projection.risk_reward,
        "Selected contract"
    );
    Some(to_recommendation(setup, contract, &projection, kind, limits))
}

fn to_recommendation(
    setup: &Setup,
    contract: &OptionContract,
    projection: &PremiumProjection,
    kind: DeltaBandKind,
    limits: &ContractConfig,
) -> ContractRecommendation {
    let multiplier = Decimal::from(limits.multiplier);
    let mid = contract.mid();
    let spread_pct = contract.spread_pct().unwrap_or(0.0);
    let expected_pnl = Decimal::from_f64(
        (projection.gain_at_target1 - projection.spread_cost) * f64::from(limits.multiplier),
    )
    .unwrap_or_default()
    .round_dp(2);
    let risk_reward = (projection.risk_reward * 100.0).round() / 100.0;

    ContractRecommendation {
        description: contract.description(),
        strike: contract.strike,
        expiry: contract.expiry,
        option_type: contract.option_type,
        delta: contract.delta,
        gamma: contract.gamma,
        theta: contract.theta,
        vega: contract.vega,
        bid: contract.bid,
        ask: contract.ask,
        premium_mid: mid.round_dp(2),
        spread_pct: (spread_pct * 10_000.0).round() / 10_000.0,
        liquidity_score: liquidity_score(contract),
        risk_reward,
        expected_pnl_at_target1: expected_pnl,
        max_loss: (mid * multiplier).round_dp(2),
        reasoning: format!(
            "{:.2} delta {} in the {} band for {}; R:R {:.2} after spread and theta",
            contract.delta.abs(),
            contract.option_type,
            match kind {
                DeltaBandKind::Strict => "strict",
                DeltaBandKind::Relaxed => "relaxed",
            },
            setup.setup_type,
            risk_reward,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Direction, OptionType, SetupStatus};
    use crate::setup::fixtures::sample_setup;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn call(strike: Decimal, delta: f64, bid: Decimal, ask: Decimal) -> OptionContract {
        OptionContract {
            strike,
            expiry: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            option_type: OptionType::Call,
            bid,
            ask,
            delta,
            gamma: 0.01,
            theta: -1.0,
            vega: 0.3,
            implied_volatility: 0.16,
            open_interest: 1_000,
            volume: 200,
        }
    }

    fn setup() -> Setup {
        // fade_at_wall in ranging: target 0.24, strict band 0.10..0.38
        sample_setup(Direction::Bullish, SetupStatus::Ready)
    }

    #[test]
    fn test_delta_targets_follow_regime() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(delta_target_for_setup(SetupType::FadeAtWall, Regime::Ranging), 0.24));
        assert!(close(delta_target_for_setup(SetupType::OrbBreakout, Regime::Trending), 0.28));
        assert!(close(delta_target_for_setup(SetupType::TrendPullback, Regime::Trending), 0.24));
        assert!(close(delta_target_for_setup(SetupType::MeanReversion, Regime::Breakout), 0.22));
    }

    #[test]
    fn test_strict_band_is_narrower_than_relaxed() {
        let strict = delta_band_for_setup(SetupType::FadeAtWall, Regime::Ranging, DeltaBandKind::Strict);
        let relaxed = delta_band_for_setup(SetupType::FadeAtWall, Regime::Ranging, DeltaBandKind::Relaxed);
        assert!((strict.min - 0.10).abs() < 1e-9);
        assert!((strict.max - 0.38).abs() < 1e-9);
        assert!(relaxed.min < strict.min && relaxed.max > strict.max);
    }

    #[test]
    fn test_none_when_everything_is_illiquid() {
        let mut thin = call(dec!(5010), 0.25, dec!(5.0), dec!(5.2));
        thin.open_interest = 10;
        let mut wide = call(dec!(5015), 0.22, dec!(2.0), dec!(4.0));
        wide.volume = 500;

        let limits = ContractConfig::default();
        assert_eq!(recommend_contract(&setup(), &[thin, wide], &limits), None);
    }

    #[test]
    fn test_wrong_type_is_ignored() {
        let mut put = call(dec!(4990), -0.25, dec!(5.0), dec!(5.2));
        put.option_type = OptionType::Put;
        assert_eq!(recommend_contract(&setup(), &[put], &ContractConfig::default()), None);
    }

    #[test]
    fn test_picks_highest_risk_reward() {
        let chain = vec![
            call(dec!(5020), 0.15, dec!(2.0), dec!(2.2)),
            call(dec!(5005), 0.35, dec!(8.0), dec!(8.2)),
            call(dec!(5010), 0.25, dec!(5.0), dec!(5.2)),
        ];
        let limits = ContractConfig::default();
        let pick = recommend_contract(&setup(), &chain, &limits).unwrap();

        let best = chain
            .iter()
            .map(|c| (c.strike, project_premium(&setup(), c).risk_reward))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert_eq!(pick.strike, best.0);
        assert_eq!(pick.max_loss, pick.premium_mid * dec!(100));
        assert!(pick.reasoning.contains("strict"));
    }

    #[test]
    fn test_relaxed_band_used_when_strict_is_empty() {
        let chain = vec![call(dec!(4980), 0.42, dec!(20.0), dec!(20.4))];
        let pick = recommend_contract(&setup(), &chain, &ContractConfig::default()).unwrap();
        assert!(pick.reasoning.contains("relaxed"));
    }

    #[test]
    fn test_risk_cap_excludes_expensive_contracts() {
        let chain = vec![call(dec!(5000), 0.3, dec!(35.5), dec!(36.0))];
        assert_eq!(recommend_contract(&setup(), &chain, &ContractConfig::default()), None);
    }

    #[test]
    fn test_liquidity_score_bounds() {
        let liquid = call(dec!(5000), 0.3, dec!(5.0), dec!(5.1));
        let score = liquidity_score(&liquid);
        assert!(score > 50.0 && score <= 100.0);
    }
}
