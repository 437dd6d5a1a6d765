//! Domain types shared by every stage of the decision core

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional bias of a setup or flow print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// Option type that expresses this direction
    pub fn option_type(&self) -> OptionType {
        match self {
            Direction::Bullish => OptionType::Call,
            Direction::Bearish => OptionType::Put,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

/// Prevailing market-behavior classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Compression,
    Breakout,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Trending => write!(f, "trending"),
            Regime::Ranging => write!(f, "ranging"),
            Regime::Compression => write!(f, "compression"),
            Regime::Breakout => write!(f, "breakout"),
        }
    }
}

/// Where a price level came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelCategory {
    Structural,
    Tactical,
    Intraday,
    Options,
    SpyDerived,
    Fibonacci,
}

/// Qualitative strength tag attached by the level producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStrength {
    Strong,
    Moderate,
    Weak,
    Dynamic,
    Critical,
}

/// Test/hold statistics reported with a level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelStats {
    #[serde(default)]
    pub tests_today: u32,
    /// Hold rate in percent (0-100)
    #[serde(default)]
    pub hold_rate: Option<f64>,
    #[serde(default)]
    pub last_test_at: Option<DateTime<Utc>>,
}

/// A single price level. Never mutated after it is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub symbol: String,
    pub category: LevelCategory,
    pub price: f64,
    pub strength: LevelStrength,
    /// Producer tag, e.g. "pdh", "call_wall", "fib_618_daily"
    pub source: String,
    #[serde(default)]
    pub stats: LevelStats,
}

impl Level {
    pub fn new(
        symbol: impl Into<String>,
        category: LevelCategory,
        price: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            category,
            price,
            strength: LevelStrength::Moderate,
            source: source.into(),
            stats: LevelStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: LevelStats) -> Self {
        self.stats = stats;
        self
    }
}

/// Defensibility class of a cluster zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Minor,
    Moderate,
    Defended,
    Fortress,
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneType::Fortress => write!(f, "fortress"),
            ZoneType::Defended => write!(f, "defended"),
            ZoneType::Moderate => write!(f, "moderate"),
            ZoneType::Minor => write!(f, "minor"),
        }
    }
}

/// A level that contributed to a cluster zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSource {
    pub source: String,
    pub category: LevelCategory,
    pub price: f64,
    pub symbol: String,
}

/// Price band where several independent levels coincide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterZone {
    pub id: String,
    pub price_low: f64,
    pub price_high: f64,
    pub cluster_score: f64,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub sources: Vec<ZoneSource>,
    pub test_count: u32,
    pub last_test_at: Option<DateTime<Utc>>,
    pub held: Option<bool>,
    pub hold_rate: Option<f64>,
}

impl ClusterZone {
    pub fn mid(&self) -> f64 {
        (self.price_low + self.price_high) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.price_low && price <= self.price_high
    }
}

/// Setup families produced by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupType {
    FadeAtWall,
    BreakoutVacuum,
    MeanReversion,
    TrendContinuation,
    OrbBreakout,
    TrendPullback,
    FlipReclaim,
    VwapReclaim,
    VwapFadeAtBand,
}

impl SetupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupType::FadeAtWall => "fade_at_wall",
            SetupType::BreakoutVacuum => "breakout_vacuum",
            SetupType::MeanReversion => "mean_reversion",
            SetupType::TrendContinuation => "trend_continuation",
            SetupType::OrbBreakout => "orb_breakout",
            SetupType::TrendPullback => "trend_pullback",
            SetupType::FlipReclaim => "flip_reclaim",
            SetupType::VwapReclaim => "vwap_reclaim",
            SetupType::VwapFadeAtBand => "vwap_fade_at_band",
        }
    }

    /// Breakout and trend families
    pub fn is_trend_family(&self) -> bool {
        matches!(
            self,
            SetupType::OrbBreakout
                | SetupType::TrendPullback
                | SetupType::TrendContinuation
                | SetupType::BreakoutVacuum
        )
    }
}

impl std::fmt::Display for SetupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display tier of a setup; `hidden` setups are not surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupTier {
    SniperPrimary,
    SniperSecondary,
    Watchlist,
    Hidden,
}

/// Setup lifecycle state. Ordered: a setup only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    Forming,
    Ready,
    Triggered,
    ResolvedTarget,
    ResolvedStop,
    Expired,
}

impl SetupStatus {
    /// Progress rank; all terminal states share the top rank
    pub fn rank(&self) -> u8 {
        match self {
            SetupStatus::Forming => 0,
            SetupStatus::Ready => 1,
            SetupStatus::Triggered => 2,
            SetupStatus::ResolvedTarget | SetupStatus::ResolvedStop | SetupStatus::Expired => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Forming or ready
    pub fn is_pre_trigger(&self) -> bool {
        matches!(self, SetupStatus::Forming | SetupStatus::Ready)
    }

    /// Ready or triggered
    pub fn is_actionable(&self) -> bool {
        matches!(self, SetupStatus::Ready | SetupStatus::Triggered)
    }
}

impl std::fmt::Display for SetupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SetupStatus::Forming => "forming",
            SetupStatus::Ready => "ready",
            SetupStatus::Triggered => "triggered",
            SetupStatus::ResolvedTarget => "resolved_target",
            SetupStatus::ResolvedStop => "resolved_stop",
            SetupStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Trader position state used to scope coaching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    Scan,
    Evaluate,
    InTrade,
}

impl std::fmt::Display for TradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeMode::Scan => write!(f, "scan"),
            TradeMode::Evaluate => write!(f, "evaluate"),
            TradeMode::InTrade => write!(f, "in_trade"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryZone {
    pub low: f64,
    pub high: f64,
}

impl EntryZone {
    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub price: f64,
    #[serde(default)]
    pub label: String,
}

impl Target {
    pub fn new(price: f64, label: impl Into<String>) -> Self {
        Self {
            price,
            label: label.into(),
        }
    }
}

/// Historical outcome statistics for similar setups at this zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    pub tests: u32,
    pub wins: u32,
    pub losses: u32,
    /// Win rate in percent (0-100)
    pub win_rate_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTrend {
    Up,
    Flat,
    Down,
}

/// A candidate trade with an entry zone, a stop and two targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub id: String,
    #[serde(rename = "type")]
    pub setup_type: SetupType,
    pub direction: Direction,
    pub entry_zone: EntryZone,
    pub stop: f64,
    pub target1: Target,
    pub target2: Target,
    pub confluence_score: f64,
    #[serde(default)]
    pub confluence_sources: Vec<String>,
    #[serde(default)]
    pub cluster_zone: Option<ClusterZone>,
    pub regime: Regime,
    pub status: SetupStatus,
    /// Detector probability in percent (0-100)
    pub probability: f64,
    /// Tier assigned by the detector
    #[serde(default)]
    pub tier: Option<SetupTier>,
    /// Tier assigned by scoring
    #[serde(default)]
    pub assessed_tier: Option<SetupTier>,
    #[serde(default)]
    pub recommended_contract: Option<ContractRecommendation>,
    #[serde(default)]
    pub decision_drivers: Vec<String>,
    #[serde(default)]
    pub decision_risks: Vec<String>,
    /// Multi-timeframe alignment (0-100)
    #[serde(default)]
    pub alignment_score: Option<f64>,
    /// Decision confidence (0-100)
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Calibrated win probability (0-1)
    #[serde(default)]
    pub p_win_calibrated: Option<f64>,
    #[serde(default)]
    pub ev_r: Option<f64>,
    #[serde(default)]
    pub confidence_trend: Option<ConfidenceTrend>,
    #[serde(default)]
    pub memory: Option<MemoryContext>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_updated_at: Option<DateTime<Utc>>,
}

impl Setup {
    pub fn entry_mid(&self) -> f64 {
        self.entry_zone.mid()
    }

    /// Points between the entry mid and the stop
    pub fn risk_points(&self) -> f64 {
        (self.entry_mid() - self.stop).abs()
    }

    /// Points between the entry mid and target1
    pub fn reward_points(&self) -> f64 {
        (self.target1.price - self.entry_mid()).abs()
    }

    /// Most recent lifecycle timestamp
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.status_updated_at
            .or(self.triggered_at)
            .unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowEventType {
    Sweep,
    Block,
}

/// An options flow print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: FlowEventType,
    pub symbol: String,
    pub strike: f64,
    pub size: f64,
    pub direction: Direction,
    pub premium: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "C"),
            OptionType::Put => write!(f, "P"),
        }
    }
}

/// One row of an option-chain snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub strike: Decimal,
    pub expiry: NaiveDate,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub bid: Decimal,
    pub ask: Decimal,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    #[serde(default)]
    pub implied_volatility: f64,
    pub open_interest: u64,
    pub volume: u64,
}

impl OptionContract {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Spread as a fraction of mid; `None` when mid is not positive
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return None;
        }
        (self.spread() / mid).to_f64()
    }

    pub fn description(&self) -> String {
        format!("{}{} {}", self.strike.normalize(), self.option_type, self.expiry)
    }
}

/// Selected contract annotated with risk figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecommendation {
    pub description: String,
    pub strike: Decimal,
    pub expiry: NaiveDate,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub bid: Decimal,
    pub ask: Decimal,
    pub premium_mid: Decimal,
    pub spread_pct: f64,
    pub liquidity_score: f64,
    pub risk_reward: f64,
    pub expected_pnl_at_target1: Decimal,
    pub max_loss: Decimal,
    pub reasoning: String,
}
