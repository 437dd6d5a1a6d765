//! Wire telemetry normalization
//!
//! Raw realtime messages arrive as `{type, channel, data, timestamp, sequence,
//! source}` envelopes. Price and microbar messages carry their fields flat on
//! the envelope instead of under `data`. Everything is mapped through
//! [`normalize_realtime_event`] into one closed [`EventPayload`] union.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::errors::{CoreError, Result};
use crate::common::types::{ClusterZone, Direction, FlowEvent, FlowEventType, Level, Regime, Setup};

/// Raw realtime message as received from the stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    /// RFC 3339 string or epoch milliseconds
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
    /// Flat fields used by price and microbar messages
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl RawEvent {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Stream channel families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Price,
    Microbar,
    Setups,
    Coach,
    Flow,
    Levels,
    Clusters,
    Regime,
    Gex,
    Heartbeat,
    Status,
}

/// Canonical channel: a family plus an optional symbol suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub symbol: Option<String>,
}

impl Channel {
    pub fn new(kind: ChannelKind, symbol: Option<String>) -> Self {
        Self { kind, symbol }
    }

    /// Parse a wire channel name such as `price:SPX` or `setups:update`
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (family, suffix) = match trimmed.split_once(':') {
            Some((family, suffix)) => (family.to_lowercase(), Some(suffix)),
            None => (trimmed.to_lowercase(), None),
        };

        let symbol_suffix = |suffix: Option<&str>| -> Result<Option<String>> {
            match suffix {
                Some(sym) if is_symbol(sym) => Ok(Some(sym.to_uppercase())),
                _ => Err(CoreError::UnknownChannel(raw.to_string())),
            }
        };

        let channel = match (family.as_str(), suffix) {
            ("price", s) => Channel::new(ChannelKind::Price, symbol_suffix(s)?),
            ("microbar", s) => Channel::new(ChannelKind::Microbar, symbol_suffix(s)?),
            ("gex", s) => Channel::new(ChannelKind::Gex, symbol_suffix(s)?),
            ("setups", Some("update")) => Channel::new(ChannelKind::Setups, None),
            ("coach", Some("message")) => Channel::new(ChannelKind::Coach, None),
            ("flow", Some("alert")) => Channel::new(ChannelKind::Flow, None),
            ("levels", Some("update")) => Channel::new(ChannelKind::Levels, None),
            ("clusters", Some("update")) => Channel::new(ChannelKind::Clusters, None),
            ("regime", Some("update")) => Channel::new(ChannelKind::Regime, None),
            ("heartbeat", None) => Channel::new(ChannelKind::Heartbeat, None),
            ("status", None) => Channel::new(ChannelKind::Status, None),
            _ => return Err(CoreError::UnknownChannel(raw.to_string())),
        };
        Ok(channel)
    }

    /// Key used for per-channel sequence tracking
    pub fn key(&self) -> String {
        match (&self.kind, &self.symbol) {
            (ChannelKind::Price, Some(s)) => format!("price:{}", s),
            (ChannelKind::Microbar, Some(s)) => format!("microbar:{}", s),
            (ChannelKind::Gex, Some(s)) => format!("gex:{}", s),
            (ChannelKind::Setups, _) => "setups:update".to_string(),
            (ChannelKind::Coach, _) => "coach:message".to_string(),
            (ChannelKind::Flow, _) => "flow:alert".to_string(),
            (ChannelKind::Levels, _) => "levels:update".to_string(),
            (ChannelKind::Clusters, _) => "clusters:update".to_string(),
            (ChannelKind::Regime, _) => "regime:update".to_string(),
            (ChannelKind::Heartbeat, _) => "heartbeat".to_string(),
            (ChannelKind::Status, _) => "status".to_string(),
            (kind, None) => format!("{:?}", kind).to_lowercase(),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

fn is_symbol(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 12
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Wire message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Price,
    Microbar,
    Setup,
    Coach,
    Flow,
    Levels,
    Clusters,
    Regime,
    Gex,
    Heartbeat,
    Status,
}

impl EventKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "price" => Ok(EventKind::Price),
            "microbar" => Ok(EventKind::Microbar),
            "spx_setup" => Ok(EventKind::Setup),
            "spx_coach" => Ok(EventKind::Coach),
            "spx_flow" => Ok(EventKind::Flow),
            "spx_levels" => Ok(EventKind::Levels),
            "spx_clusters" => Ok(EventKind::Clusters),
            "spx_regime" => Ok(EventKind::Regime),
            "spx_gex" => Ok(EventKind::Gex),
            "heartbeat" => Ok(EventKind::Heartbeat),
            "status" => Ok(EventKind::Status),
            other => Err(CoreError::UnknownEventKind(other.to_string())),
        }
    }

    /// Channel family a kind must travel on
    pub fn channel_kind(&self) -> ChannelKind {
        match self {
            EventKind::Price => ChannelKind::Price,
            EventKind::Microbar => ChannelKind::Microbar,
            EventKind::Setup => ChannelKind::Setups,
            EventKind::Coach => ChannelKind::Coach,
            EventKind::Flow => ChannelKind::Flow,
            EventKind::Levels => ChannelKind::Levels,
            EventKind::Clusters => ChannelKind::Clusters,
            EventKind::Regime => ChannelKind::Regime,
            EventKind::Gex => ChannelKind::Gex,
            EventKind::Heartbeat => ChannelKind::Heartbeat,
            EventKind::Status => ChannelKind::Status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub price: f64,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microbar {
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub bucket_start_ms: Option<i64>,
    #[serde(default)]
    pub bucket_end_ms: Option<i64>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub trades: Option<u64>,
    #[serde(default)]
    pub finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupAction {
    Created,
    Updated,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupUpdate {
    pub setup: Setup,
    pub action: SetupAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeUpdate {
    pub regime: Regime,
    #[serde(default)]
    pub direction: Option<RegimeDirection>,
    /// Directional probability in percent
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GexUpdate {
    pub net_gex: f64,
    #[serde(default)]
    pub flip_point: Option<f64>,
    #[serde(default)]
    pub call_wall: Option<f64>,
    #[serde(default)]
    pub put_wall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelsUpdate {
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClustersUpdate {
    pub zones: Vec<ClusterZone>,
}

/// Coach narration as carried on the wire. Ids and timestamps are filled from the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachWire {
    #[serde(rename = "type")]
    pub message_type: crate::coach::types::CoachMessageType,
    pub priority: crate::coach::types::CoachPriority,
    pub content: String,
    #[serde(default)]
    pub setup_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub structured_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: FlowEventType,
    symbol: String,
    strike: f64,
    size: f64,
    direction: Direction,
    premium: f64,
}

/// Connectivity and broker state pushed by the upstream gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default)]
    pub stream_connected: Option<bool>,
    #[serde(default)]
    pub broker_connected: Option<bool>,
    #[serde(default)]
    pub execution_mode: Option<crate::risk::execution::ExecutionMode>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Closed union of everything the core consumes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Price(PriceTick),
    Microbar(Microbar),
    Setup(SetupUpdate),
    Coach(crate::coach::types::CoachMessage),
    Flow(FlowEvent),
    Levels(LevelsUpdate),
    Clusters(ClustersUpdate),
    Regime(RegimeUpdate),
    Gex(GexUpdate),
    Heartbeat,
    Status(StatusUpdate),
}

/// A validated, typed realtime event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub channel: Channel,
    pub symbol: Option<String>,
    pub timestamp_ms: i64,
    pub sequence: Option<u64>,
    pub source: Option<String>,
    pub received_at_ms: i64,
    pub payload: EventPayload,
}

impl NormalizedEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        ms_to_datetime(self.timestamp_ms)
    }
}

pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Map a raw wire message into a [`NormalizedEvent`]
///
/// The channel defaults to the family implied by `type`; price, microbar and
/// gex channels then need a symbol, taken from the envelope `symbol` field.
pub fn normalize_realtime_event(raw: &RawEvent, received_at_ms: i64) -> Result<NormalizedEvent> {
    let kind = EventKind::parse(&raw.kind)?;
    let body = raw
        .data
        .clone()
        .unwrap_or_else(|| Value::Object(raw.rest.clone()));
    let body_symbol = body
        .get("symbol")
        .or_else(|| raw.rest.get("symbol"))
        .and_then(Value::as_str)
        .map(str::to_uppercase);

    let channel = match &raw.channel {
        Some(name) => Channel::parse(name)?,
        None => {
            let family = kind.channel_kind();
            let needs_symbol = matches!(
                family,
                ChannelKind::Price | ChannelKind::Microbar | ChannelKind::Gex
            );
            if needs_symbol && body_symbol.is_none() {
                return Err(CoreError::InvalidEvent(format!(
                    "{} message without channel or symbol",
                    raw.kind
                )));
            }
            Channel::new(family, if needs_symbol { body_symbol.clone() } else { None })
        }
    };

    if channel.kind != kind.channel_kind() {
        return Err(CoreError::InvalidEvent(format!(
            "{} message on channel {}",
            raw.kind, channel
        )));
    }

    let timestamp_ms = match &raw.timestamp {
        Some(value) => parse_timestamp(value)?,
        None => received_at_ms,
    };

    let payload = match kind {
        EventKind::Price => {
            let tick: PriceTick = decode(&raw.kind, body)?;
            if !tick.price.is_finite() || tick.price <= 0.0 {
                return Err(CoreError::InvalidEvent(format!(
                    "price must be finite and positive, got {}",
                    tick.price
                )));
            }
            EventPayload::Price(tick)
        }
        EventKind::Microbar => {
            let bar: Microbar = decode(&raw.kind, body)?;
            let prices = [bar.open, bar.high, bar.low, bar.close];
            if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) || bar.low > bar.high {
                return Err(CoreError::InvalidEvent("microbar prices out of range".to_string()));
            }
            EventPayload::Microbar(bar)
        }
        EventKind::Setup => EventPayload::Setup(decode(&raw.kind, body)?),
        EventKind::Coach => {
            let wire: CoachWire = decode(&raw.kind, body)?;
            let id = wire.id.clone().unwrap_or_else(|| {
                format!("coach-{}-{}", timestamp_ms, raw.sequence.unwrap_or_default())
            });
            EventPayload::Coach(crate::coach::types::CoachMessage {
                id,
                message_type: wire.message_type,
                priority: wire.priority,
                setup_id: wire.setup_id,
                content: wire.content,
                structured_data: wire.structured_data.unwrap_or(Value::Null),
                timestamp: ms_to_datetime(timestamp_ms),
            })
        }
        EventKind::Flow => {
            let wire: FlowWire = decode(&raw.kind, body)?;
            if !wire.premium.is_finite() || !wire.size.is_finite() || wire.size < 0.0 {
                return Err(CoreError::InvalidEvent("flow size/premium out of range".to_string()));
            }
            let id = wire.id.unwrap_or_else(|| {
                format!("flow-{}-{}-{}", wire.symbol, wire.strike, timestamp_ms)
            });
            EventPayload::Flow(FlowEvent {
                id,
                event_type: wire.event_type,
                symbol: wire.symbol.to_uppercase(),
                strike: wire.strike,
                size: wire.size,
                direction: wire.direction,
                premium: wire.premium,
                timestamp: ms_to_datetime(timestamp_ms),
            })
        }
        EventKind::Levels => EventPayload::Levels(decode(&raw.kind, body)?),
        EventKind::Clusters => EventPayload::Clusters(decode(&raw.kind, body)?),
        EventKind::Regime => EventPayload::Regime(decode(&raw.kind, body)?),
        EventKind::Gex => {
            let gex: GexUpdate = decode(&raw.kind, body)?;
            if !gex.net_gex.is_finite() {
                return Err(CoreError::InvalidEvent("netGex must be finite".to_string()));
            }
            EventPayload::Gex(gex)
        }
        EventKind::Heartbeat => EventPayload::Heartbeat,
        EventKind::Status => EventPayload::Status(decode(&raw.kind, body)?),
    };

    let symbol = channel.symbol.clone().or_else(|| match &payload {
        EventPayload::Setup(update) => update
            .setup
            .cluster_zone
            .as_ref()
            .and_then(|zone| zone.sources.first())
            .map(|source| source.symbol.to_uppercase())
            .or_else(|| body_symbol.clone()),
        EventPayload::Flow(flow) => Some(flow.symbol.clone()),
        EventPayload::Levels(update) => update
            .levels
            .first()
            .map(|level| level.symbol.to_uppercase())
            .or_else(|| body_symbol.clone()),
        _ => body_symbol.clone(),
    });

    Ok(NormalizedEvent {
        channel,
        symbol,
        timestamp_ms,
        sequence: raw.sequence,
        source: raw.source.clone(),
        received_at_ms,
        payload,
    })
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| CoreError::InvalidEvent(format!("{} payload: {}", kind, e)))
}

fn parse_timestamp(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(|| CoreError::InvalidEvent(format!("bad timestamp {}", n))),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| CoreError::InvalidEvent(format!("bad timestamp {}: {}", s, e))),
        other => Err(CoreError::InvalidEvent(format!("bad timestamp {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(text: &str) -> RawEvent {
        RawEvent::from_json(text).unwrap()
    }

    #[test]
    fn test_flat_price_message() {
        let event = normalize_realtime_event(
            &raw(r#"{"type":"price","channel":"price:spx","symbol":"SPX","price":5012.5,"volume":10,"timestamp":"2026-03-02T15:00:00Z","sequence":7}"#),
            1_000,
        )
        .unwrap();

        assert_eq!(event.channel.key(), "price:SPX");
        assert_eq!(event.symbol.as_deref(), Some("SPX"));
        assert_eq!(event.sequence, Some(7));
        assert_eq!(event.received_at_ms, 1_000);
        match event.payload {
            EventPayload::Price(tick) => assert_eq!(tick.price, 5012.5),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_price_without_channel_uses_symbol() {
        let event = normalize_realtime_event(
            &raw(r#"{"type":"price","symbol":"spy","price":501.2,"timestamp":1772463600000}"#),
            0,
        )
        .unwrap();
        assert_eq!(event.channel.key(), "price:SPY");
        assert_eq!(event.timestamp_ms, 1_772_463_600_000);
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let err = normalize_realtime_event(
            &raw(r#"{"type":"price","channel":"price:SPX","price":0}"#),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEvent(_)));
    }

    #[test]
    fn test_unknown_kind_is_typed_error() {
        let err = normalize_realtime_event(&raw(r#"{"type":"spx_basis","channel":"basis:update"}"#), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownEventKind(k) if k == "spx_basis"));
    }

    #[test]
    fn test_unknown_channel_is_typed_error() {
        let err = normalize_realtime_event(&raw(r#"{"type":"heartbeat","channel":"positions:abc"}"#), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownChannel(_)));
    }

    #[test]
    fn test_kind_channel_mismatch_is_rejected() {
        let err = normalize_realtime_event(
            &raw(r#"{"type":"spx_flow","channel":"coach:message","data":{}}"#),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEvent(_)));
    }

    #[test]
    fn test_flow_alert_gets_envelope_timestamp() {
        let event = normalize_realtime_event(
            &raw(r#"{"type":"spx_flow","channel":"flow:alert","timestamp":"2026-03-02T15:00:00Z","sequence":3,
                "data":{"type":"sweep","symbol":"SPX","strike":5000,"expiry":"2026-03-02","size":400,"direction":"bullish","premium":250000}}"#),
            0,
        )
        .unwrap();

        assert_eq!(event.symbol.as_deref(), Some("SPX"));
        match event.payload {
            EventPayload::Flow(flow) => {
                assert_eq!(flow.event_type, FlowEventType::Sweep);
                assert_eq!(flow.timestamp.timestamp_millis(), event.timestamp_ms);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_invalid_event() {
        let err = normalize_realtime_event(
            &raw(r#"{"type":"spx_gex","channel":"gex:SPX","data":{"flipPoint":5000}}"#),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEvent(_)));
    }

    #[test]
    fn test_heartbeat_has_no_symbol() {
        let event = normalize_realtime_event(&raw(r#"{"type":"heartbeat"}"#), 42).unwrap();
        assert_eq!(event.payload, EventPayload::Heartbeat);
        assert_eq!(event.symbol, None);
        assert_eq!(event.timestamp_ms, 42);
    }
}
