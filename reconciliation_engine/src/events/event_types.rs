use std::fmt::Display;

use mps_common::UsdAmount;
use serde::{Deserialize, Serialize};

use crate::db_types::{InvoiceId, Order, OrderId, OrderStatusType, UserId};

//--------------------------------------       Channel         -------------------------------------------------------
/// The transport a notification arrived on. Diagnostics only; reconciliation decisions never depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Channel {
    #[default]
    Webhook,
    Stream,
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Webhook => write!(f, "webhook"),
            Channel::Stream => write!(f, "stream"),
        }
    }
}

//--------------------------------------       EventKind       -------------------------------------------------------
/// The gateway's event names. The set is closed on our side; names we have never seen deserialize to `Other` and
/// are carried along for logging, with `status` driving the actual state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "payment.created")]
    Created,
    #[serde(rename = "payment.paid")]
    Paid,
    #[serde(rename = "payment.confirmed")]
    Confirmed,
    #[serde(rename = "payment.expired")]
    Expired,
    #[serde(rename = "payment.failed")]
    Failed,
    #[serde(rename = "payment.cancelled")]
    Cancelled,
    #[serde(other)]
    Other,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Created => "payment.created",
            EventKind::Paid => "payment.paid",
            EventKind::Confirmed => "payment.confirmed",
            EventKind::Expired => "payment.expired",
            EventKind::Failed => "payment.failed",
            EventKind::Cancelled => "payment.cancelled",
            EventKind::Other => "payment.other",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------   NotificationEvent   -------------------------------------------------------
/// The unified, transport-agnostic notification shape. Both the webhook body and the stream's `notification`
/// frames normalise into this before reaching the reconciliation engine; unrecognised payload fields are kept in
/// the `metadata` bag but never drive control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event: EventKind,
    pub invoice_id: InvoiceId,
    /// The merchant order id, when the gateway echoes it back. Resolved via the invoice index when absent.
    #[serde(rename = "merchant_order_id")]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub status: OrderStatusType,
    #[serde(default)]
    pub amount_received: f64,
    #[serde(default)]
    pub currency: String,
    /// USD equivalent of `amount_received`, computed by the gateway at confirmation time.
    #[serde(default)]
    pub usd_amount: Option<UsdAmount>,
    #[serde(default)]
    pub fiat_amount: Option<f64>,
    #[serde(default)]
    pub fiat_currency: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(skip)]
    pub channel: Channel,
}

impl NotificationEvent {
    pub fn from_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

//--------------------------------------     Hook payloads     -------------------------------------------------------
/// Fired exactly once per order, on the transition into `Confirmed`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmedEvent {
    pub order: Order,
    /// The amount credited to the user's balance, if any was.
    pub credited: Option<UsdAmount>,
}

/// Fired when an order reaches a terminal state without being paid out (expired, failed or cancelled).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}
