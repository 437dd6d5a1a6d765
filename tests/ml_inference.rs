//! ML layer tests: weight loading through a mocked source, rollout gating
//! and hot-path latency

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::mock;
use mockall::predicate::eq;
use rust_decimal_macros::dec;

use setup_decision_core::common::latency::LatencyBench;
use setup_decision_core::common::traits::WeightsSource;
use setup_decision_core::common::types::OptionType;
use setup_decision_core::ml::features::FeatureVector;
use setup_decision_core::ml::iv_forecast::{IvDirection, IvFeatures};
use setup_decision_core::ml::mtf::MtfInput;
use setup_decision_core::ml::registry::ModelRegistry;
use setup_decision_core::ml::rollout::RolloutPolicy;
use setup_decision_core::ml::{InferenceSource, ModelKind};
use setup_decision_core::{CoreError, MlLayer, OptionContract, RolloutPolicies};

mock! {
    pub Store {}

    #[async_trait]
    impl WeightsSource for Store {
        async fn fetch(&self, kind: ModelKind) -> setup_decision_core::Result<Option<String>>;
        fn source_name(&self) -> &str;
    }
}

const CONFIDENCE_WEIGHTS: &str = r#"{
    "version": "conf-mock-1",
    "intercept": -0.4,
    "weights": { "confluenceScore": 0.35, "flowBias": 0.8, "regimeCompatibility": 0.6 }
}"#;

fn store_with_confidence() -> MockStore {
    let mut store = MockStore::new();
    store.expect_source_name().return_const("mock-store".to_string());
    store
        .expect_fetch()
        .with(eq(ModelKind::Confidence))
        .times(1)
        .returning(|_| Ok(Some(CONFIDENCE_WEIGHTS.to_string())));
    store
        .expect_fetch()
        .with(eq(ModelKind::FlowAnomaly))
        .times(1)
        .returning(|_| Err(CoreError::Internal("store offline".to_string())));
    store
        .expect_fetch()
        .with(eq(ModelKind::IvForecast))
        .times(1)
        .returning(|_| Ok(Some("{ not json".to_string())));
    store
        .expect_fetch()
        .with(eq(ModelKind::MtfWeights))
        .times(1)
        .returning(|_| Ok(None));
    store
        .expect_fetch()
        .with(eq(ModelKind::SetupTier))
        .times(1)
        .returning(|_| Ok(None));
    store
}

fn all_on() -> RolloutPolicies {
    let on = RolloutPolicy::new(true, 100);
    RolloutPolicies {
        confidence: on,
        flow_anomaly: on,
        iv_forecast: on,
        mtf_weights: on,
        setup_tier: on,
    }
}

fn features() -> FeatureVector {
    FeatureVector {
        confluence_score: 3.0,
        regime_compatibility: 0.8,
        flow_bias: 0.4,
        ..Default::default()
    }
}

fn contract(strike: rust_decimal::Decimal, volume: u64, open_interest: u64) -> OptionContract {
    OptionContract {
        strike,
        expiry: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
        option_type: OptionType::Call,
        bid: dec!(4.80),
        ask: dec!(5.00),
        delta: 0.42,
        gamma: 0.012,
        theta: -1.1,
        vega: 0.3,
        implied_volatility: 0.18,
        open_interest,
        volume,
    }
}

#[test_log::test(tokio::test)]
async fn test_only_valid_weights_are_installed() {
    let registry = ModelRegistry::new();
    let installed = registry.load_from(&store_with_confidence()).await;

    assert_eq!(installed, 1);
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.version(ModelKind::Confidence), Some("conf-mock-1"));
    assert_eq!(snapshot.version(ModelKind::IvForecast), None);
    assert_eq!(snapshot.version(ModelKind::MtfWeights), None);
    assert_eq!(snapshot.version(ModelKind::SetupTier), None);
}

#[test_log::test(tokio::test)]
async fn test_rollout_gates_loaded_model() {
    let registry = Arc::new(ModelRegistry::new());
    registry.load_from(&store_with_confidence()).await;

    let enabled = MlLayer::new(Arc::clone(&registry), all_on());
    let confidence = enabled.confidence(&features(), Some("trader-1")).unwrap();
    assert!(confidence > 0.0 && confidence < 100.0);

    let disabled = MlLayer::new(registry, RolloutPolicies::default());
    assert_eq!(disabled.confidence(&features(), Some("trader-1")), None);
}

#[test_log::test]
fn test_empty_store_keeps_builtin_snapshot() {
    let mut store = MockStore::new();
    store.expect_source_name().return_const("empty-store".to_string());
    store.expect_fetch().times(5).returning(|_| Ok(None));

    let registry = ModelRegistry::with_builtin_defaults();
    let before = registry.snapshot().version(ModelKind::FlowAnomaly).map(str::to_string);
    let installed = tokio_test::block_on(registry.load_from(&store));

    assert_eq!(installed, 0);
    assert!(before.is_some());
    assert_eq!(
        registry.snapshot().version(ModelKind::FlowAnomaly).map(str::to_string),
        before
    );
    assert_eq!(
        registry.snapshot().version(ModelKind::SetupTier),
        Some("tier-default-v1")
    );
}

#[test_log::test]
fn test_missing_models_fall_back() {
    let layer = MlLayer::new(Arc::new(ModelRegistry::new()), all_on());

    assert_eq!(layer.confidence(&features(), Some("trader-1")), None);

    let weighting = layer.timeframe_weights(&MtfInput::default(), Some("trader-1"));
    assert_eq!(weighting.source, InferenceSource::Fallback);
    let w = weighting.weights;
    assert!((w.m1 + w.m5 + w.m15 + w.h1 - 1.0).abs() < 1e-9);

    let forecast = layer.iv_forecast(None, &IvFeatures::default(), Some("trader-1"));
    assert_eq!(forecast.direction, IvDirection::Unknown);
    assert_eq!(forecast.predicted_iv, None);

    let mut chain: Vec<OptionContract> = (0..8).map(|_| contract(dec!(5000), 50, 1_000)).collect();
    chain.push(contract(dec!(5005), 6_000, 500));
    let anomaly = layer.flow_anomaly(&chain, 120, Some("trader-1")).unwrap();
    assert_eq!(anomaly.source, InferenceSource::Fallback);
    assert_eq!(anomaly.average_path_length, None);

    let setup = common::ready_setup();
    let tier = layer.setup_tier(&features(), &setup, 65.0, Some("trader-1"));
    assert_eq!(tier.source, InferenceSource::RuleBased);
    assert_eq!(tier.probability, None);
}

#[test_log::test]
fn test_inference_stays_under_a_millisecond() {
    let layer = MlLayer::new(Arc::clone(&common::BUILTIN_REGISTRY), all_on());
    let vector = features();
    let chain = vec![
        contract(dec!(5000), 1_200, 3_000),
        contract(dec!(5005), 9_000, 1_500),
        contract(dec!(5010), 300, 4_000),
    ];
    let iv_features = IvFeatures {
        iv_momentum: 0.1,
        ..Default::default()
    };

    LatencyBench::assert_average_under("confidence", 500, Duration::from_millis(1), || {
        let _ = layer.confidence(&vector, Some("trader-1"));
    });
    LatencyBench::assert_average_under("timeframe_weights", 500, Duration::from_millis(1), || {
        let _ = layer.timeframe_weights(&MtfInput::default(), Some("trader-1"));
    });
    LatencyBench::assert_average_under("flow_anomaly", 200, Duration::from_millis(1), || {
        let _ = layer.flow_anomaly(&chain, 45, Some("trader-1"));
    });
    let setup = common::ready_setup();
    LatencyBench::assert_average_under("setup_tier", 500, Duration::from_millis(1), || {
        let _ = layer.setup_tier(&vector, &setup, 65.0, Some("trader-1"));
    });
    LatencyBench::assert_average_under("iv_forecast", 500, Duration::from_millis(1), || {
        let _ = layer.iv_forecast(Some(0.18), &iv_features, Some("trader-1"));
    });
}
