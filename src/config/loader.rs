//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{CoreError, Result};
use crate::ml::rollout::RolloutPolicy;

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, `__` between sections)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| CoreError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| CoreError::Configuration(e.to_string()))
}

/// Load configuration from a handful of flat environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::default();

    if let Ok(value) = std::env::var("HEARTBEAT_STALE_MS") {
        config.trust.heartbeat_stale_ms = parse_env("HEARTBEAT_STALE_MS", &value)?;
    }
    if let Ok(value) = std::env::var("ML_WEIGHTS_DIR") {
        config.ml.weights_dir = Some(value);
    }
    if let Ok(value) = std::env::var("ML_ROLLOUT_USER") {
        config.settings.user_id = Some(value);
    }

    config.ml.confidence = rollout_from_env("ML_CONFIDENCE", config.ml.confidence)?;
    config.ml.flow_anomaly = rollout_from_env("ML_FLOW_ANOMALY", config.ml.flow_anomaly)?;
    config.ml.iv_forecast = rollout_from_env("ML_IV_FORECAST", config.ml.iv_forecast)?;
    config.ml.mtf_weights = rollout_from_env("ML_MTF_WEIGHTS", config.ml.mtf_weights)?;
    config.ml.setup_tier = rollout_from_env("ML_TIER", config.ml.setup_tier)?;

    Ok(config)
}

/// Reads `<PREFIX>_ENABLED` and `<PREFIX>_AB_PERCENT`
fn rollout_from_env(prefix: &str, current: RolloutPolicy) -> Result<RolloutPolicy> {
    let mut policy = current;
    if let Ok(value) = std::env::var(format!("{}_ENABLED", prefix)) {
        if let Some(flag) = parse_flag(&value) {
            policy.enabled = flag;
        }
    }
    if let Ok(value) = std::env::var(format!("{}_AB_PERCENT", prefix)) {
        let percent: i64 = parse_env(&format!("{}_AB_PERCENT", prefix), &value)?;
        policy.percent = percent.clamp(0, 100) as u8;
    }
    Ok(policy)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Configuration(format!("{} is not a valid number: {}", name, value)))
}

/// Accepts the usual truthy/falsy spellings; anything else is ignored
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_spellings() {
        assert_eq!(parse_flag(" Enabled "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some("does-not-exist.toml")).unwrap();
        assert_eq!(config.trust.heartbeat_stale_ms, 15_000);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        let result: Result<i64> = parse_env("X", "abc");
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }
}
