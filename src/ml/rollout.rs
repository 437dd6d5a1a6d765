//! Deterministic per-user A/B rollout
//!
//! A user lands in bucket `hash(user_id) % 100`; the model is on for that user
//! when its global flag is set and the bucket is below the rollout percent.
//! The same user always lands in the same bucket.

use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_percent")]
    pub percent: u8,
}

fn default_percent() -> u8 {
    35
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            percent: default_percent(),
        }
    }
}

impl RolloutPolicy {
    pub fn new(enabled: bool, percent: u8) -> Self {
        Self { enabled, percent }
    }
}

/// Maps a user id onto a 32-bit bucket hash
pub trait BucketHasher: Send + Sync {
    fn hash(&self, input: &str) -> u32;
}

/// 32-bit FNV-1a over UTF-16 code units
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aHasher;

impl BucketHasher for Fnv1aHasher {
    fn hash(&self, input: &str) -> u32 {
        input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
            (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
        })
    }
}

/// Rollout bucket in [0, 100)
pub fn rollout_bucket(user_id: &str, hasher: &dyn BucketHasher) -> u32 {
    hasher.hash(user_id) % 100
}

pub fn is_enabled_for_user(
    policy: &RolloutPolicy,
    user_id: Option<&str>,
    hasher: &dyn BucketHasher,
) -> bool {
    if !policy.enabled || policy.percent == 0 {
        return false;
    }
    if policy.percent >= 100 {
        return true;
    }
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => rollout_bucket(id, hasher) < u32::from(policy.percent),
        None => false,
    }
}
