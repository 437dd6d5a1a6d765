//! Decision engine: per-symbol pipeline and the event router feeding it

pub mod pipeline;
pub mod router;

pub use pipeline::{EngineCounters, EngineSettings, EngineSummary, EntryGates, ScoredSetup, SymbolEngine};
pub use router::run_event_router;
