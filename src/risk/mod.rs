//! Entry gating

pub mod envelope;
pub mod execution;

pub use envelope::{evaluate_risk_envelope_entry_gate, GateDecision, GateReason, RiskEnvelopeThresholds};
pub use execution::{resolve_execution_entry_gate, ExecutionMode};
