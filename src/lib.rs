//! Setup Decision Core
//!
//! Turns a normalized realtime market stream into scored, gated trade setups
//! with coach decision briefs, per symbol.

pub mod coach;
pub mod common;
pub mod config;
pub mod contract;
pub mod engine;
pub mod levels;
pub mod market;
pub mod ml;
pub mod risk;
pub mod scenario;
pub mod setup;

// Re-export commonly used types
pub use common::errors::{CoreError, Result};
pub use common::types::{
    ClusterZone, Direction, Level, OptionContract, Regime, Setup, SetupStatus, SetupType, TradeMode,
};
pub use config::types::AppConfig;
pub use engine::{run_event_router, EngineSettings, EngineSummary, SymbolEngine};
pub use market::events::{normalize_realtime_event, NormalizedEvent, RawEvent};
pub use ml::{MlLayer, RolloutPolicies};

// Coach types
pub use coach::{CoachDecisionBrief, CoachDecisionRequest, CoachMessage, Verdict};
