//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use crate::market::events::NormalizedEvent;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new normalized event channel with the default buffer size
pub fn create_event_channel() -> (mpsc::Sender<NormalizedEvent>, mpsc::Receiver<NormalizedEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new normalized event channel with a custom buffer size
pub fn create_event_channel_with_size(
    size: usize,
) -> (mpsc::Sender<NormalizedEvent>, mpsc::Receiver<NormalizedEvent>) {
    mpsc::channel(size.max(1))
}
