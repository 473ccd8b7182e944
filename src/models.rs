use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

/// What kind of data an event carries. The wire format uses snake_case tags
/// so clients can switch on the `event_type` field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StockTick,
    ScoreUpdate,
    Metric,
    Notification,
    Weather,
    Heartbeat,
    Ping,
    Pong,
    Error,
    Control,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StockTick => "stock_tick",
            EventType::ScoreUpdate => "score_update",
            EventType::Metric => "metric",
            EventType::Notification => "notification",
            EventType::Weather => "weather",
            EventType::Heartbeat => "heartbeat",
            EventType::Ping => "ping",
            EventType::Pong => "pong",
            EventType::Error => "error",
            EventType::Control => "control",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transport that delivered an event. Events are born `internal`; each
/// transport stamps its own tag onto a copy at delivery time, so the same
/// event can reach three subscribers with three different stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    ShortPoll,
    LongPoll,
    Sse,
    Websocket,
    Internal,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::ShortPoll => "short_poll",
            Transport::LongPoll => "long_poll",
            Transport::Sse => "sse",
            Transport::Websocket => "websocket",
            Transport::Internal => "internal",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The universal wrapper for a piece of data in the system. Immutable once
/// produced, except that the delivery path replaces `protocol` on a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub protocol: Transport,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value, source: &str) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            payload,
            generated_at: Utc::now(),
            source: source.to_string(),
            protocol: Transport::Internal,
        }
    }

    /// Synthetic keep-alive event emitted by the dispatch loop during idle.
    pub fn heartbeat(transport: Transport) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: EventType::Heartbeat,
            payload: json!({ "ping": "pong" }),
            generated_at: Utc::now(),
            source: "system".to_string(),
            protocol: transport,
        }
    }

    /// Copy of this event carrying the delivering transport's stamp. The
    /// original is left untouched so no subscriber observes another's stamp.
    pub fn stamped(&self, transport: Transport) -> Self {
        let mut copy = self.clone();
        copy.protocol = transport;
        copy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Ok,
    Timeout,
    Empty,
}

/// Batch response shared by the short and long polling endpoints.
/// `next_poll_ms` is the server-suggested delay before the next request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub events: Vec<Event>,
    pub status: PollStatus,
    pub next_poll_ms: u64,
    pub server_time: DateTime<Utc>,
}

/// Hybrid negotiation descriptor: the preferred transport plus an ordered
/// fallback list and the URL for each transport the endpoint group offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub preferred: Transport,
    pub fallback: Vec<Transport>,
    pub ws_url: Option<String>,
    pub sse_url: Option<String>,
    pub long_poll_url: Option<String>,
    pub short_poll_url: Option<String>,
    pub reason: String,
}

/// Point-in-time counters exposed by `/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub active_ws: usize,
    pub active_sse: usize,
    pub pending_long_polls: usize,
    pub total_events_dispatched: u64,
    pub uptime_s: f64,
    pub server_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_tags() {
        assert_eq!(
            serde_json::to_string(&EventType::StockTick).unwrap(),
            "\"stock_tick\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::ScoreUpdate).unwrap(),
            "\"score_update\""
        );
        let parsed: EventType = serde_json::from_str("\"heartbeat\"").unwrap();
        assert_eq!(parsed, EventType::Heartbeat);
    }

    #[test]
    fn test_transport_wire_tags() {
        assert_eq!(
            serde_json::to_string(&Transport::ShortPoll).unwrap(),
            "\"short_poll\""
        );
        assert_eq!(
            serde_json::to_string(&Transport::Websocket).unwrap(),
            "\"websocket\""
        );
        assert_eq!(Transport::LongPoll.as_str(), "long_poll");
    }

    #[test]
    fn test_new_event_defaults() {
        let event = Event::new(EventType::Metric, json!({ "cpu": 42 }), "metrics");
        assert_eq!(event.protocol, Transport::Internal);
        assert_eq!(event.source, "metrics");
        assert!(!event.event_id.is_empty());
    }

    #[test]
    fn test_stamped_copies_do_not_share_protocol() {
        let original = Event::new(EventType::StockTick, json!({ "ticker": "AAPL" }), "stocks");
        let sse = original.stamped(Transport::Sse);
        let ws = original.stamped(Transport::Websocket);

        assert_eq!(original.protocol, Transport::Internal);
        assert_eq!(sse.protocol, Transport::Sse);
        assert_eq!(ws.protocol, Transport::Websocket);
        // Same identity, different delivery stamps
        assert_eq!(sse.event_id, ws.event_id);
        assert_eq!(sse.payload, ws.payload);
    }

    #[test]
    fn test_heartbeat_shape() {
        let hb = Event::heartbeat(Transport::Sse);
        assert_eq!(hb.event_type, EventType::Heartbeat);
        assert_eq!(hb.source, "system");
        assert_eq!(hb.protocol, Transport::Sse);
        assert_eq!(hb.payload, json!({ "ping": "pong" }));
    }

    #[test]
    fn test_poll_status_tags() {
        assert_eq!(serde_json::to_string(&PollStatus::Ok).unwrap(), "\"ok\"");
        assert_eq!(
            serde_json::to_string(&PollStatus::Timeout).unwrap(),
            "\"timeout\""
        );
        assert_eq!(
            serde_json::to_string(&PollStatus::Empty).unwrap(),
            "\"empty\""
        );
    }

    #[test]
    fn test_event_round_trip() {
        let event = Event::new(EventType::Weather, json!({ "temperature": 21.5 }), "weather");
        let encoded = serde_json::to_string(&event.stamped(Transport::Sse)).unwrap();
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.event_id, event.event_id);
        assert_eq!(decoded.protocol, Transport::Sse);
    }
}
