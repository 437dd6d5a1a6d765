//! Shared types, errors and plumbing

pub mod channels;
pub mod errors;
pub mod latency;
pub mod traits;
pub mod types;
