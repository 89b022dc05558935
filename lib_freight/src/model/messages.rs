//! # Inbound Socket Messages
//!
//! Frames arrive as UTF-8 JSON envelopes of the form
//! `{ "type": "<kind>", "data": <payload>, "timestamp": <sent at> }`
//! (`kind` / `payload` are accepted as aliases). The tag is resolved into
//! [`SyncMessage`], a closed set of kinds each carrying its own typed payload.
//!
//! Decoding never fails, so the connection is never torn down over bad input:
//! a frame that is not JSON becomes [`SyncMessage::Raw`] holding the original
//! text, and a JSON envelope naming an unknown kind (or carrying a payload of
//! the wrong shape) becomes [`SyncMessage::Unknown`] with its tag and data.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::dashboard::{Alert, ClassifierMetrics, FlightData, KpiData, TradeRoute};

/// Every message kind the upstream feed can push.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Replacement KPI block.
    KpiUpdate(KpiData),
    /// Replacement flight board.
    FlightUpdate(Vec<FlightData>),
    /// Replacement trade lanes.
    RouteUpdate(Vec<TradeRoute>),
    /// Replacement classifier metrics.
    ClassifierUpdate(ClassifierMetrics),
    /// A single new alert.
    Alert(Alert),
    /// Keep-alive echo from the server.
    Heartbeat,
    /// A JSON envelope of an unrecognised kind, or with a malformed payload.
    Unknown {
        /// The envelope's tag; empty when it had none.
        kind: String,
        /// The envelope's payload.
        data: Value,
    },
    /// A frame that is not JSON, verbatim.
    Raw(String),
}

impl SyncMessage {
    /// The wire tag of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            SyncMessage::KpiUpdate(_) => "kpi_update",
            SyncMessage::FlightUpdate(_) => "flight_update",
            SyncMessage::RouteUpdate(_) => "route_update",
            SyncMessage::ClassifierUpdate(_) => "aduanapp_update",
            SyncMessage::Alert(_) => "alert",
            SyncMessage::Heartbeat => "heartbeat",
            SyncMessage::Unknown { .. } => "unknown",
            SyncMessage::Raw(_) => "raw",
        }
    }
}

/// A decoded frame stamped with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// The decoded message.
    pub message: SyncMessage,
    /// The sender's own timestamp, when the envelope carried one.
    pub sent_at: Option<String>,
    /// When this process received the frame.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Decodes one text frame.
    pub fn decode(text: &str) -> Self {
        let received_at = Utc::now();

        let envelope: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to parse socket frame ({}): {}", e, text);
                return Self::raw(text, None, received_at);
            }
        };

        let sent_at = envelope.get("timestamp").map(|ts| match ts {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let tag = envelope
            .get("type")
            .or_else(|| envelope.get("kind"))
            .and_then(Value::as_str);
        let data = envelope
            .get("data")
            .or_else(|| envelope.get("payload"))
            .cloned()
            .unwrap_or(Value::Null);

        let decoded = match tag {
            Some("kpi_update") => serde_json::from_value(data.clone()).map(SyncMessage::KpiUpdate),
            Some("flight_update") => {
                serde_json::from_value(data.clone()).map(SyncMessage::FlightUpdate)
            }
            Some("route_update") => serde_json::from_value(data.clone()).map(SyncMessage::RouteUpdate),
            Some("aduanapp_update") => {
                serde_json::from_value(data.clone()).map(SyncMessage::ClassifierUpdate)
            }
            Some("alert") => serde_json::from_value(data.clone()).map(SyncMessage::Alert),
            Some("heartbeat") => Ok(SyncMessage::Heartbeat),
            other => {
                log::warn!("Unknown socket message kind: {:?}", other);
                return Self::unknown(tag, data, sent_at, received_at);
            }
        };

        match decoded {
            Ok(message) => Self {
                message,
                sent_at,
                received_at,
            },
            Err(e) => {
                log::warn!("Malformed {:?} payload: {}", tag, e);
                Self::unknown(tag, data, sent_at, received_at)
            }
        }
    }

    /// True when the frame was not JSON at all.
    pub fn is_raw(&self) -> bool {
        matches!(self.message, SyncMessage::Raw(_))
    }

    fn unknown(
        tag: Option<&str>,
        data: Value,
        sent_at: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message: SyncMessage::Unknown {
                kind: tag.unwrap_or_default().to_string(),
                data,
            },
            sent_at,
            received_at,
        }
    }

    fn raw(text: &str, sent_at: Option<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            message: SyncMessage::Raw(text.to_string()),
            sent_at,
            received_at,
        }
    }
}

/// The keep-alive frame sent while a socket is open.
pub fn heartbeat_frame(now: DateTime<Utc>) -> String {
    json!({ "type": "heartbeat", "timestamp": now.timestamp_millis() }).to_string()
}
