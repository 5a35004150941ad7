use chrono::{DateTime, Utc};
use mps_common::UsdAmount;
use reconciliation_engine::db_types::{InvoiceId, Order, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// The body of a `POST /api/payments/create-invoice` call from the storefront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceParams {
    pub user_id: UserId,
    pub amount: f64,
    pub currency: String,
    pub network: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Invoice lifetime in seconds, if the storefront wants to override the gateway default.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// What the storefront gets back after an invoice has been created and the order seeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceCreatedResponse {
    pub success: bool,
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,
    pub address: Option<String>,
    /// The requested amount.
    pub amount: f64,
    /// The exact amount the payer must transfer. The gateway disambiguates deposits by unique amounts.
    pub amount_to_pay: Option<f64>,
    pub payment_id: Option<String>,
    pub currency: String,
    pub network: String,
    pub payment_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The acknowledgement body for webhook deliveries. Returned with 200 whenever the signature checks out,
/// whether or not the notification changed anything, so the gateway stops retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { received: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: UsdAmount,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub count: usize,
}

impl From<Vec<Order>> for OrderList {
    fn from(orders: Vec<Order>) -> Self {
        let count = orders.len();
        Self { orders, count }
    }
}
