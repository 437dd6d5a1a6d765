//! Per-symbol decision pipeline
//!
//! A [`SymbolEngine`] owns every piece of mutable state for one symbol: the
//! trust orchestrator, the market context, cluster zones, the setup registry
//! and the coach timeline. Only the router task for that symbol touches it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::coach::brief::build_rule_based_decision;
use crate::coach::dedupe::{CoachTimeline, TimelineStats};
use crate::coach::explain::apply_explainability;
use crate::coach::policy::normalize_coach_decision_for_mode;
use crate::coach::types::{CoachDecisionBrief, CoachDecisionRequest, CoachMessage};
use crate::common::errors::{CoreError, Result};
use crate::common::traits::EventHandler;
use crate::common::types::{ClusterZone, OptionContract, Setup, SetupStatus, TradeMode};
use crate::config::types::{AppConfig, CoachConfig, ContractConfig};
use crate::contract::selector::recommend_contract;
use crate::levels::cluster::{build_cluster_zones, nearest_zone};
use crate::levels::confluence::{
    calculate_confluence, confluence_input_for, memory_edge_bonus, MAX_CONFLUENCE_SCORE,
};
use crate::levels::regime::regime_compatibility;
use crate::market::context::{MarketContext, MarketMetrics};
use crate::market::events::{ms_to_datetime, EventPayload, NormalizedEvent, SetupAction};
use crate::market::feed_health::{resolve_feed_health, FeedHealth, FeedHealthInput, FreshnessLimits, PriceSource};
use crate::market::trust::{MarketDataOrchestrator, TrustState, TrustThresholds};
use crate::ml::anomaly::FlowAnomalyCandidate;
use crate::ml::features::extract_features;
use crate::ml::mtf::MtfInput;
use crate::ml::{InferenceSource, MlLayer};
use crate::risk::envelope::{evaluate_risk_envelope_entry_gate, GateDecision, RiskEnvelopeThresholds};
use crate::risk::execution::{resolve_execution_entry_gate, ExecutionMode};
use crate::scenario::{build_scenario_lanes, ScenarioLane};
use crate::setup::decision::{decision_inputs, enrich_setup, evaluate_setup_decision, timeframe_alignment};
use crate::setup::lifecycle::StatusTransition;
use crate::setup::registry::SetupRegistry;
use crate::setup::viability::{derive_trade_mode, has_valid_geometry};

/// Settings shared by every symbol engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub trust: TrustThresholds,
    pub freshness: FreshnessLimits,
    pub gates: RiskEnvelopeThresholds,
    pub contract: ContractConfig,
    pub coach: CoachConfig,
    pub user_id: Option<String>,
    /// Buffer for each per-symbol channel
    pub channel_size: usize,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            trust: TrustThresholds::from(&config.trust),
            freshness: FreshnessLimits::from(&config.trust),
            gates: RiskEnvelopeThresholds::from(&config.gates),
            contract: config.contract.clone(),
            coach: config.coach.clone(),
            user_id: config.settings.user_id.clone(),
            channel_size: config.settings.channel_size,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Outcome of scoring one setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSetup {
    pub setup: Setup,
    pub confidence_source: InferenceSource,
    pub weights_source: InferenceSource,
    pub tier_source: InferenceSource,
}

/// Both entry checkpoints for one setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryGates {
    pub setup_id: String,
    pub risk_envelope: GateDecision,
    pub execution: GateDecision,
}

impl EntryGates {
    pub fn blocked(&self) -> bool {
        self.risk_envelope.blocked || self.execution.blocked
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCounters {
    pub events: u64,
    pub setups_scored: u64,
    pub scoring_failures: u64,
    pub transitions: u64,
    pub retired: u64,
}

/// End-of-stream report for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSummary {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub active_setups: usize,
    pub actionable_setup_ids: Vec<String>,
    pub counters: EngineCounters,
    pub coach_checked: u64,
    pub coach_suppressed: u64,
    pub coach_accepted: u64,
    pub trust: TrustState,
}

pub struct SymbolEngine {
    symbol: String,
    settings: EngineSettings,
    ml: Arc<MlLayer>,
    orchestrator: MarketDataOrchestrator,
    context: MarketContext,
    zones: Vec<ClusterZone>,
    registry: SetupRegistry,
    timeline: CoachTimeline,
    chain: Vec<OptionContract>,
    stream_connected: bool,
    broker_connected: bool,
    execution_mode: ExecutionMode,
    status_message: Option<String>,
    last_event_ms: i64,
    transitions: Vec<StatusTransition>,
    counters: EngineCounters,
}

impl std::fmt::Debug for SymbolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolEngine")
            .field("symbol", &self.symbol)
            .field("setups", &self.registry.len())
            .field("zones", &self.zones.len())
            .field("counters", &self.counters)
            .finish()
    }
}

impl SymbolEngine {
    pub fn new(symbol: impl Into<String>, settings: EngineSettings, ml: Arc<MlLayer>) -> Self {
        let symbol = symbol.into();
        Self {
            orchestrator: MarketDataOrchestrator::new(settings.trust),
            context: MarketContext::new(symbol.clone(), ms_to_datetime(0)),
            timeline: CoachTimeline::new(settings.coach.dedupe_window_ms, settings.coach.timeline_capacity),
            symbol,
            settings,
            ml,
            zones: Vec::new(),
            registry: SetupRegistry::new(),
            chain: Vec::new(),
            stream_connected: true,
            broker_connected: false,
            execution_mode: ExecutionMode::Off,
            status_message: None,
            last_event_ms: 0,
            transitions: Vec::new(),
            counters: EngineCounters::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn context(&self) -> &MarketContext {
        &self.context
    }

    pub fn registry(&self) -> &SetupRegistry {
        &self.registry
    }

    pub fn zones(&self) -> &[ClusterZone] {
        &self.zones
    }

    pub fn timeline(&self) -> &CoachTimeline {
        &self.timeline
    }

    /// Last free-text status pushed by the stream
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Transitions recorded since the last drain
    pub fn drain_transitions(&mut self) -> Vec<StatusTransition> {
        std::mem::take(&mut self.transitions)
    }

    pub fn set_metrics(&mut self, metrics: MarketMetrics) {
        self.context.metrics = metrics;
        self.rescore_all();
    }

    /// Replace the option-chain snapshot and re-pick contracts
    pub fn set_option_chain(&mut self, chain: Vec<OptionContract>) {
        self.chain = chain;
        self.rescore_all();
    }

    /// Apply one normalized event in arrival order
    #[instrument(skip(self, event), fields(symbol = %self.symbol, channel = %event.channel))]
    pub fn handle_event(&mut self, event: &NormalizedEvent) {
        self.counters.events += 1;
        self.orchestrator.ingest(event);
        self.last_event_ms = self.last_event_ms.max(event.received_at_ms);
        self.context.now = event.timestamp();

        match &event.payload {
            EventPayload::Price(tick) => {
                self.context.record_price(tick.price, event.timestamp_ms);
                self.advance_lifecycle();
            }
            EventPayload::Microbar(bar) => {
                self.context.record_price(bar.close, event.timestamp_ms);
                self.advance_lifecycle();
            }
            EventPayload::Setup(update) => match update.action {
                SetupAction::Created | SetupAction::Updated => {
                    let id = update.setup.id.clone();
                    self.registry.upsert(update.setup.clone());
                    self.rescore(&id);
                    self.advance_lifecycle();
                }
                SetupAction::Expired => {
                    let mut expired = update.setup.clone();
                    expired.status = SetupStatus::Expired;
                    self.registry.upsert(expired);
                    self.retire();
                }
            },
            EventPayload::Coach(message) => {
                self.timeline.ingest(message.clone());
            }
            EventPayload::Flow(flow) => {
                self.context.record_flow(flow.clone());
                self.rescore_all();
            }
            EventPayload::Levels(update) => {
                self.zones = build_cluster_zones(&update.levels);
                debug!(zones = self.zones.len(), "Rebuilt cluster zones");
                self.rescore_all();
            }
            EventPayload::Clusters(update) => {
                self.zones = update.zones.clone();
                self.rescore_all();
            }
            EventPayload::Regime(update) => {
                self.context.record_regime(update);
                self.rescore_all();
            }
            EventPayload::Gex(gex) => {
                self.context.gex = Some(gex.clone());
                self.rescore_all();
            }
            EventPayload::Heartbeat => {}
            EventPayload::Status(status) => {
                if let Some(connected) = status.stream_connected {
                    if connected && !self.stream_connected {
                        info!("Stream reconnected");
                    }
                    self.stream_connected = connected;
                }
                if let Some(connected) = status.broker_connected {
                    self.broker_connected = connected;
                }
                if let Some(mode) = status.execution_mode {
                    self.execution_mode = mode;
                }
                if let Some(message) = &status.message {
                    self.status_message = Some(message.clone());
                }
            }
        }
    }

    fn advance_lifecycle(&mut self) {
        let transitions = self.registry.advance(self.context.last_price, self.context.now);
        if !transitions.is_empty() {
            for t in &transitions {
                info!(setup_id = %t.setup_id, from = %t.from, to = %t.to, "Setup transition");
            }
            self.counters.transitions += transitions.len() as u64;
            self.transitions.extend(transitions);
        }
        self.retire();
    }

    fn retire(&mut self) {
        let retired = self.registry.retire_terminal();
        self.counters.retired += retired.len() as u64;
    }

    fn rescore_all(&mut self) {
        let ids: Vec<String> = self.registry.iter().map(|s| s.id.clone()).collect();
        for id in ids {
            self.rescore(&id);
        }
    }

    /// Score one setup in place; a failure is logged and leaves the setup as it was
    fn rescore(&mut self, setup_id: &str) {
        let Some(current) = self.registry.get(setup_id) else {
            return;
        };
        match self.score_setup(current) {
            Ok(scored) => {
                self.counters.setups_scored += 1;
                self.registry.upsert(scored.setup);
            }
            Err(e) => {
                self.counters.scoring_failures += 1;
                warn!(setup_id, error = %e, "Setup scoring failed");
            }
        }
    }

    /// Confluence, timeframe weighting, confidence and contract for one setup
    pub fn score_setup(&self, setup: &Setup) -> Result<ScoredSetup> {
        if !has_valid_geometry(setup) {
            return Err(CoreError::InvalidSetup {
                setup_id: setup.id.clone(),
                reason: "entry, stop and targets are not ordered for the direction".to_string(),
            });
        }
        let user_id = self.settings.user_id.as_deref();
        let ctx = &self.context;
        let mut next = setup.clone();

        if next.cluster_zone.is_none() {
            next.cluster_zone = nearest_zone(&self.zones, next.entry_mid())
                .filter(|zone| zone.contains(next.entry_mid()))
                .cloned();
        }

        let confluence = calculate_confluence(&confluence_input_for(&next, ctx));
        let compat = regime_compatibility(next.regime, ctx.regime);
        let memory_bonus = next.memory.as_ref().map_or(0.0, |memory| {
            let win_rate = memory.win_rate_pct.unwrap_or(0.0) / 100.0;
            memory_edge_bonus(win_rate, memory.tests, compat)
        });
        // Detector score is a floor; live context can only add to it
        let live_score = (confluence.score + memory_bonus).min(MAX_CONFLUENCE_SCORE);
        next.confluence_score = next.confluence_score.max(live_score);
        for source in confluence.sources {
            if !next.confluence_sources.contains(&source) {
                next.confluence_sources.push(source);
            }
        }

        let inputs = decision_inputs(&next, ctx);
        let frames = timeframe_alignment(&inputs);
        let weighting = self.ml.timeframe_weights(
            &MtfInput {
                align_1m: frames.m1,
                align_5m: frames.m5,
                align_15m: frames.m15,
                align_1h: frames.h1,
                regime_compatibility: inputs.regime_score,
                flow_bias: inputs.flow_bias,
            },
            user_id,
        );
        let decision = evaluate_setup_decision(&next, ctx, &weighting.weights);
        enrich_setup(&mut next, &decision);

        let features = extract_features(&next, ctx);
        let confidence_source = match self.ml.confidence(&features, user_id) {
            Some(confidence) => {
                next.confidence = Some(confidence);
                next.p_win_calibrated = Some(confidence / 100.0);
                InferenceSource::Ml
            }
            None => InferenceSource::RuleBased,
        };
        let tier = self
            .ml
            .setup_tier(&features, &next, next.confidence.unwrap_or(next.probability), user_id);
        next.assessed_tier = Some(tier.tier.setup_tier());

        if !self.chain.is_empty() {
            next.recommended_contract = recommend_contract(&next, &self.chain, &self.settings.contract);
        }

        Ok(ScoredSetup {
            setup: next,
            confidence_source,
            weights_source: weighting.source,
            tier_source: tier.source,
        })
    }

    /// Trust orchestrator reading at `now_ms`
    pub fn trust_state(&self, now_ms: i64) -> TrustState {
        self.orchestrator.evaluate(now_ms, self.stream_connected)
    }

    /// Acknowledge a sequence gap after the caller resynchronized
    pub fn clear_sequence_gap(&mut self) {
        self.orchestrator.clear_sequence_gap();
    }

    pub fn feed_health(&self, now_ms: i64) -> FeedHealth {
        let trust = self.trust_state(now_ms);
        let price_source = match (self.stream_connected, self.context.last_price_at_ms) {
            (_, None) => None,
            (true, Some(_)) => Some(PriceSource::Tick),
            (false, Some(_)) => Some(PriceSource::Snapshot),
        };
        let input = FeedHealthInput {
            snapshot_available: self.context.last_price.is_some(),
            stream_connected: self.stream_connected,
            price_source,
            price_age_ms: self.context.last_price_at_ms.map(|at| (now_ms - at).max(0)),
            limits: self.settings.freshness,
            ..Default::default()
        }
        .with_trust(&trust);
        resolve_feed_health(&input)
    }

    /// Risk-envelope and execution checkpoints for one setup
    ///
    /// `None` when the setup is unknown or withheld from presentation.
    pub fn entry_gates(&self, setup_id: &str, now_ms: i64) -> Option<EntryGates> {
        let setup = self.registry.get_presentable(setup_id, self.context.last_price)?;
        let health = self.feed_health(now_ms);
        let feed_blocked = health.fallback_policy.block_trade_entry;

        let risk_envelope = evaluate_risk_envelope_entry_gate(setup, feed_blocked, &self.settings.gates);
        let execution = resolve_execution_entry_gate(
            feed_blocked,
            health.message.as_deref(),
            self.broker_connected,
            self.execution_mode,
        );
        if risk_envelope.blocked || execution.blocked {
            debug!(
                setup_id,
                risk = %risk_envelope.reason_code,
                execution = %execution.reason_code,
                "Entry blocked"
            );
        }
        Some(EntryGates {
            setup_id: setup_id.to_string(),
            risk_envelope,
            execution,
        })
    }

    pub fn scenario_lanes(&self, setup_id: &str) -> Vec<ScenarioLane> {
        build_scenario_lanes(self.registry.get(setup_id), self.context.last_price)
    }

    /// Most anomalous contract in the current chain, if any clears the threshold
    pub fn scan_flow_anomaly(&self) -> Option<FlowAnomalyCandidate> {
        let minute = self
            .context
            .metrics
            .minutes_into_session
            .filter(|m| m.is_finite() && *m >= 0.0)
            .map_or(0, |m| m as u32);
        self.ml
            .flow_anomaly(&self.chain, minute, self.settings.user_id.as_deref())
    }

    /// Rule-based brief from the timeline, enriched and scoped to the trader's mode
    pub fn coach_decision(
        &self,
        request: &CoachDecisionRequest,
        now: DateTime<Utc>,
    ) -> CoachDecisionBrief {
        let setup = request
            .setup_id
            .as_deref()
            .and_then(|id| self.registry.get_presentable(id, self.context.last_price));
        let messages: Vec<CoachMessage> = self
            .timeline
            .scoped(request.setup_id.as_deref())
            .cloned()
            .collect();

        let brief = build_rule_based_decision(&messages, request, now);
        let brief = apply_explainability(&brief, setup, now);

        let mode = derive_trade_mode(
            self.settings.coach.trade_mode_scoping,
            request.trade_mode.unwrap_or(TradeMode::Scan),
            setup.map(|s| s.status),
        );
        match mode {
            Some(mode) => {
                normalize_coach_decision_for_mode(&brief, mode, request.setup_id.as_deref())
                    .into_owned()
            }
            None => brief,
        }
    }

    /// Expire all open setups at the session close
    pub fn close_session(&mut self, now: DateTime<Utc>) -> Vec<StatusTransition> {
        let transitions = self.registry.session_end(now);
        self.counters.transitions += transitions.len() as u64;
        self.counters.retired += transitions.len() as u64;
        transitions
    }

    pub fn timeline_stats(&self) -> TimelineStats {
        self.timeline.stats()
    }

    pub fn summary(&self) -> EngineSummary {
        let stats = self.timeline.stats();
        let mut actionable: Vec<String> = self
            .registry
            .actionable(self.context.last_price)
            .into_iter()
            .map(|s| s.id.clone())
            .collect();
        actionable.sort();
        EngineSummary {
            symbol: self.symbol.clone(),
            last_price: self.context.last_price,
            active_setups: self.registry.len(),
            actionable_setup_ids: actionable,
            counters: self.counters,
            coach_checked: stats.checked,
            coach_suppressed: stats.suppressed,
            coach_accepted: stats.accepted,
            trust: self.trust_state(self.last_event_ms),
        }
    }
}

impl EventHandler for SymbolEngine {
    fn handle_event(&mut self, event: &NormalizedEvent) {
        SymbolEngine::handle_event(self, event);
    }

    fn on_connect(&mut self) {
        self.stream_connected = true;
        self.status_message = None;
    }

    fn on_disconnect(&mut self, reason: Option<&str>) {
        warn!(symbol = %self.symbol, reason = reason.unwrap_or("unknown"), "Stream disconnected");
        self.stream_connected = false;
        self.status_message = reason.map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::types::{CoachMessageType, CoachPriority, Verdict};
    use crate::common::types::Direction;
    use crate::market::events::{Channel, ChannelKind, PriceTick, SetupUpdate, StatusUpdate};
    use crate::market::feed_health::DataHealth;
    use crate::ml::registry::ModelRegistry;
    use crate::ml::RolloutPolicies;
    use crate::risk::envelope::GateReason;
    use crate::setup::fixtures::sample_setup;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    const T0: i64 = 1_773_671_400_000; // 2026-03-16T14:30:00Z

    fn engine() -> SymbolEngine {
        let ml = Arc::new(MlLayer::new(
            Arc::new(ModelRegistry::with_builtin_defaults()),
            RolloutPolicies::default(),
        ));
        SymbolEngine::new("SPX", EngineSettings::default(), ml)
    }

    fn event(kind: ChannelKind, payload: EventPayload, at_ms: i64, sequence: Option<u64>) -> NormalizedEvent {
        let symbol = matches!(kind, ChannelKind::Price).then(|| "SPX".to_string());
        NormalizedEvent {
            channel: Channel::new(kind, symbol.clone()),
            symbol,
            timestamp_ms: at_ms,
            sequence,
            source: None,
            received_at_ms: at_ms,
            payload,
        }
    }

    fn price(value: f64, at_ms: i64) -> NormalizedEvent {
        event(
            ChannelKind::Price,
            EventPayload::Price(PriceTick {
                price: value,
                change: None,
                change_pct: None,
                volume: None,
            }),
            at_ms,
            None,
        )
    }

    fn setup_event(setup: Setup, at_ms: i64) -> NormalizedEvent {
        event(
            ChannelKind::Setups,
            EventPayload::Setup(SetupUpdate {
                setup,
                action: SetupAction::Created,
            }),
            at_ms,
            None,
        )
    }

    #[test]
    fn test_setup_is_scored_on_arrival() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Forming), T0));

        let stored = engine.registry().get("s1").unwrap();
        assert!(stored.confidence.is_some());
        assert!(stored.alignment_score.is_some());
        assert_eq!(engine.counters().setups_scored, 1);
    }

    #[test]
    fn test_invalid_setup_does_not_block_others() {
        let mut engine = engine();
        let mut broken = sample_setup(Direction::Bullish, SetupStatus::Forming);
        broken.id = "broken".to_string();
        broken.stop = 5050.0;
        engine.handle_event(&setup_event(broken, T0));
        engine.handle_event(&setup_event(sample_setup(Direction::Bearish, SetupStatus::Forming), T0 + 1));

        assert_eq!(engine.counters().scoring_failures, 1);
        assert!(engine.registry().get("s1").unwrap().confidence.is_some());
        assert!(engine.registry().get("broken").unwrap().confidence.is_none());
    }

    #[test]
    fn test_price_drives_lifecycle_and_retires() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Triggered), T0));
        engine.handle_event(&price(4994.0, T0 + 1_000));

        let transitions = engine.drain_transitions();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, SetupStatus::ResolvedStop);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.counters().retired, 1);
    }

    #[test]
    fn test_entry_gates_follow_status() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0));
        engine.handle_event(&price(5001.0, T0 + 1_000));

        let gates = engine.entry_gates("s1", T0 + 2_000).unwrap();
        assert_eq!(gates.execution.reason_code, GateReason::BrokerDisconnected);

        engine.handle_event(&event(
            ChannelKind::Status,
            EventPayload::Status(StatusUpdate {
                stream_connected: Some(true),
                broker_connected: Some(true),
                execution_mode: Some(ExecutionMode::Paper),
                message: None,
            }),
            T0 + 3_000,
            None,
        ));
        let gates = engine.entry_gates("s1", T0 + 4_000).unwrap();
        assert!(!gates.execution.blocked);

        let stale = engine.entry_gates("s1", T0 + 60_000).unwrap();
        assert!(stale.blocked());
        assert_eq!(stale.risk_envelope.reason_code, GateReason::FeedTrustBlocked);
    }

    #[test]
    fn test_coach_decision_is_scoped() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0));
        engine.handle_event(&event(
            ChannelKind::Coach,
            EventPayload::Coach(CoachMessage {
                id: "m1".to_string(),
                message_type: CoachMessageType::PreTrade,
                priority: CoachPriority::Setup,
                setup_id: Some("s1".to_string()),
                content: "Entry window open at 5001".to_string(),
                structured_data: Value::Null,
                timestamp: Utc.timestamp_millis_opt(T0).unwrap(),
            }),
            T0,
            None,
        ));

        let now = Utc.timestamp_millis_opt(T0 + 5_000).unwrap();
        let evaluate = engine.coach_decision(
            &CoachDecisionRequest {
                setup_id: Some("s1".to_string()),
                trade_mode: Some(TradeMode::Evaluate),
                ..Default::default()
            },
            now,
        );
        assert_eq!(evaluate.verdict, Verdict::Enter);
        assert_eq!(evaluate.risk_plan.stop, Some(4995.0));

        let scan = engine.coach_decision(
            &CoachDecisionRequest {
                setup_id: None,
                trade_mode: Some(TradeMode::Scan),
                ..Default::default()
            },
            now,
        );
        assert_eq!(scan.verdict, Verdict::Wait);
    }

    fn status(message: Option<&str>, at_ms: i64) -> NormalizedEvent {
        event(
            ChannelKind::Status,
            EventPayload::Status(StatusUpdate {
                stream_connected: None,
                broker_connected: None,
                execution_mode: None,
                message: message.map(str::to_string),
            }),
            at_ms,
            None,
        )
    }

    fn evaluate_s1(engine: &SymbolEngine, at_ms: i64) -> CoachDecisionBrief {
        engine.coach_decision(
            &CoachDecisionRequest {
                setup_id: Some("s1".to_string()),
                trade_mode: Some(TradeMode::Evaluate),
                ..Default::default()
            },
            Utc.timestamp_millis_opt(at_ms).unwrap(),
        )
    }

    #[test]
    fn test_setup_past_target1_is_withheld() {
        let mut engine = engine();
        engine.handle_event(&price(5015.0, T0));
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0 + 1_000));
        engine.handle_event(&event(
            ChannelKind::Coach,
            EventPayload::Coach(CoachMessage {
                id: "m1".to_string(),
                message_type: CoachMessageType::PreTrade,
                priority: CoachPriority::Setup,
                setup_id: Some("s1".to_string()),
                content: "Entry window open at 5001".to_string(),
                structured_data: Value::Null,
                timestamp: Utc.timestamp_millis_opt(T0 + 1_000).unwrap(),
            }),
            T0 + 1_000,
            None,
        ));

        let summary = engine.summary();
        assert_eq!(summary.active_setups, 1);
        assert!(summary.actionable_setup_ids.is_empty());
        assert!(engine.entry_gates("s1", T0 + 2_000).is_none());
        assert_ne!(evaluate_s1(&engine, T0 + 2_000).verdict, Verdict::Enter);

        engine.handle_event(&price(5005.0, T0 + 3_000));
        assert_eq!(engine.summary().actionable_setup_ids, vec!["s1".to_string()]);
        assert!(engine.entry_gates("s1", T0 + 3_500).is_some());
        assert_eq!(evaluate_s1(&engine, T0 + 3_500).verdict, Verdict::Enter);
    }

    #[test]
    fn test_resolved_setup_is_not_recreated() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0));
        engine.handle_event(&price(5001.0, T0 + 1_000));
        engine.handle_event(&price(5011.0, T0 + 2_000));
        assert!(engine.registry().get("s1").is_none());
        assert_eq!(
            engine.registry().retired_status("s1"),
            Some(SetupStatus::ResolvedTarget)
        );

        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0 + 3_000));
        assert!(engine.registry().get("s1").is_none());
        assert!(engine.summary().actionable_setup_ids.is_empty());
        assert_eq!(engine.counters().retired, 1);
    }

    #[test]
    fn test_status_without_message_keeps_previous() {
        let mut engine = engine();
        engine.handle_event(&status(Some("Broker maintenance at 16:00"), T0));
        engine.handle_event(&status(None, T0 + 1_000));
        assert_eq!(engine.status_message(), Some("Broker maintenance at 16:00"));

        engine.handle_event(&status(Some("Broker back"), T0 + 2_000));
        assert_eq!(engine.status_message(), Some("Broker back"));
    }

    #[test]
    fn test_scoring_assigns_tier() {
        let engine = engine();
        let setup = sample_setup(Direction::Bullish, SetupStatus::Ready);
        let scored = engine.score_setup(&setup).unwrap();
        assert_eq!(scored.tier_source, InferenceSource::RuleBased);
        assert!(scored.setup.assessed_tier.is_some());
        assert_eq!(scored.setup.tier, None);
    }

    #[test]
    fn test_disconnect_falls_back_to_snapshot() {
        let mut engine = engine();
        engine.handle_event(&price(5001.0, T0));
        engine.on_disconnect(Some("socket closed"));

        let health = engine.feed_health(T0 + 1_000);
        assert_eq!(health.data_health, DataHealth::Stale);
        assert!(health.flags.using_snapshot_fallback);
        assert_eq!(engine.status_message(), Some("socket closed"));

        engine.on_connect();
        assert_eq!(engine.feed_health(T0 + 1_000).data_health, DataHealth::Healthy);
    }

    #[test]
    fn test_session_close_clears_registry() {
        let mut engine = engine();
        engine.handle_event(&setup_event(sample_setup(Direction::Bullish, SetupStatus::Ready), T0));
        let transitions = engine.close_session(Utc.timestamp_millis_opt(T0 + 60_000).unwrap());
        assert_eq!(transitions.len(), 1);
        assert_eq!(engine.summary().active_setups, 0);
    }
}
