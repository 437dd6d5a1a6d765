//! Error types for the decision core

use thiserror::Error;

use crate::ml::registry::ModelError;

/// Result type alias using our CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core operations
///
/// Only boundary failures live here. Trust gaps, model fallbacks and blocked
/// entry gates are reported as values so scoring keeps running.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Wire message carried a `type` the normalizer does not know
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    /// Wire message carried a channel the normalizer does not know
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Wire message was recognized but its payload is unusable
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Model weights failed to parse or validate
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Setup geometry cannot be scored
    #[error("Invalid setup {setup_id}: {reason}")]
    InvalidSetup { setup_id: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File or stream I/O at the boundary
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Channel receive errors
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CoreError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CoreError::ChannelSend(err.to_string())
    }
}
