//! Setup lifecycle, viability and decision scoring

pub mod decision;
pub mod lifecycle;
pub mod registry;
pub mod viability;

#[cfg(test)]
pub(crate) mod fixtures;

pub use decision::{enrich_setup, evaluate_setup_decision, SetupDecision, TimeframeAlignment};
pub use lifecycle::{advance_setup, merge_status, watchlist_threshold, StatusTransition};
pub use registry::SetupRegistry;
pub use viability::{derive_trade_mode, has_progression_conflict, has_valid_geometry};
