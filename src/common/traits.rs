//! Trait seams between the core and its collaborators

use async_trait::async_trait;

use super::errors::Result;
use crate::market::events::NormalizedEvent;
use crate::ml::registry::ModelKind;

/// Source of serialized model weight blobs
///
/// Implementations fetch the JSON blob for a model kind. `Ok(None)` means the
/// model is not published, which leaves the predictor on its fallback path.
#[async_trait]
pub trait WeightsSource: Send + Sync {
    /// Fetch the raw JSON blob for one model kind
    async fn fetch(&self, kind: ModelKind) -> Result<Option<String>>;

    /// Human-readable name used in logs
    fn source_name(&self) -> &str;
}

/// Trait for handling normalized events
pub trait EventHandler: Send {
    /// Handle an incoming normalized event
    fn handle_event(&mut self, event: &NormalizedEvent);

    /// Called when the upstream stream connects
    fn on_connect(&mut self);

    /// Called when the upstream stream drops
    fn on_disconnect(&mut self, reason: Option<&str>);
}
