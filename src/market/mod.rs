//! Market telemetry: normalization, trust and feed health

pub mod context;
pub mod events;
pub mod feed_health;
pub mod trust;

pub use context::{DirectionOdds, MarketContext, MarketMetrics};
pub use events::{normalize_realtime_event, Channel, ChannelKind, EventPayload, NormalizedEvent, RawEvent};
pub use feed_health::{resolve_feed_health, FeedHealth, FeedHealthInput, FeedReasonCode};
pub use trust::{MarketDataOrchestrator, TrustState, TrustThresholds};
