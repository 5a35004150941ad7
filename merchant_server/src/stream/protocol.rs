//! Frame definitions for the gateway's websocket protocol.
//!
//! All frames are JSON text messages tagged with a `type` field. The server-side vocabulary is open-ended;
//! frame types this client does not know deserialize to [`ServerFrame::Unknown`] and are logged and skipped
//! rather than killing the connection.

use reconciliation_engine::{db_types::InvoiceId, events::NotificationEvent};
use serde::{Deserialize, Serialize};

/// Frames this client sends to the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Sent immediately after the connection opens. `["all"]` subscribes to every event kind.
    Subscribe { events: Vec<String> },
    /// Application-level keepalive. The gateway answers with a `pong` frame.
    Ping,
    /// Ask the gateway for the current state of one invoice.
    GetStatus { invoice_id: InvoiceId },
}

impl ClientFrame {
    pub fn subscribe_all() -> Self {
        ClientFrame::Subscribe { events: vec!["all".to_string()] }
    }
}

/// Frames the gateway sends to this client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        #[serde(default)]
        connection_id: Option<String>,
    },
    Subscribed {
        #[serde(default)]
        events: Vec<String>,
    },
    Pong,
    /// A payment notification. The payload under `data` is the same shape the webhook delivers.
    Notification {
        #[serde(default)]
        event: Option<String>,
        data: NotificationEvent,
    },
    /// The answer to a `get_status` request.
    InvoiceStatus { invoice: serde_json::Value },
    Error { message: String },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod test {
    use reconciliation_engine::{db_types::OrderStatusType, events::EventKind};

    use super::*;

    #[test]
    fn client_frames_serialize_to_the_wire_shapes() {
        let json = serde_json::to_value(ClientFrame::subscribe_all()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "subscribe", "events": ["all"] }));
        let json = serde_json::to_value(ClientFrame::Ping).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ping" }));
        let json = serde_json::to_value(ClientFrame::GetStatus { invoice_id: InvoiceId::from("INV-1".to_string()) })
            .unwrap();
        assert_eq!(json, serde_json::json!({ "type": "get_status", "invoice_id": "INV-1" }));
    }

    #[test]
    fn notification_frames_carry_the_webhook_payload_shape() {
        let json = serde_json::json!({
            "type": "notification",
            "event": "payment.confirmed",
            "data": {
                "event": "payment.confirmed",
                "invoice_id": "INV-1",
                "merchant_order_id": "ORDER-1",
                "status": "confirmed",
                "amount_received": 100.0,
                "currency": "USDT",
                "usd_amount": 99.8
            }
        });
        let frame: ServerFrame = serde_json::from_value(json).unwrap();
        match frame {
            ServerFrame::Notification { event, data } => {
                assert_eq!(event.as_deref(), Some("payment.confirmed"));
                assert_eq!(data.event, EventKind::Confirmed);
                assert_eq!(data.status, OrderStatusType::Confirmed);
            },
            other => panic!("Unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn control_frames_deserialize() {
        let frame: ServerFrame =
            serde_json::from_value(serde_json::json!({ "type": "connected", "connection_id": "c-1" })).unwrap();
        assert!(matches!(frame, ServerFrame::Connected { connection_id: Some(id) } if id == "c-1"));
        let frame: ServerFrame =
            serde_json::from_value(serde_json::json!({ "type": "subscribed", "events": ["all"] })).unwrap();
        assert!(matches!(frame, ServerFrame::Subscribed { events } if events == vec!["all".to_string()]));
        let frame: ServerFrame = serde_json::from_value(serde_json::json!({ "type": "pong" })).unwrap();
        assert!(matches!(frame, ServerFrame::Pong));
        let frame: ServerFrame =
            serde_json::from_value(serde_json::json!({ "type": "error", "message": "bad token" })).unwrap();
        assert!(matches!(frame, ServerFrame::Error { message } if message == "bad token"));
    }

    #[test]
    fn unknown_frame_types_do_not_fail_parsing() {
        let frame: ServerFrame =
            serde_json::from_value(serde_json::json!({ "type": "rate_update", "rate": 1.01 })).unwrap();
        assert!(matches!(frame, ServerFrame::Unknown));
    }
}
