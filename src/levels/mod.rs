//! Level clustering, confluence and regime scoring

pub mod cluster;
pub mod confluence;
pub mod regime;

pub use cluster::{build_cluster_zones, classify_zone_type, nearest_zone, CLUSTER_RADIUS_POINTS};
pub use confluence::{calculate_confluence, confluence_input_for, memory_edge_bonus, ConfluenceInput, ConfluenceResult};
pub use regime::{classify_regime, regime_compatibility, RegimeSignals, VolumeTrend};
