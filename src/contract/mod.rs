//! Contract recommendation

pub mod selector;

pub use selector::{delta_band_for_setup, delta_target_for_setup, recommend_contract, DeltaBand, DeltaBandKind};
