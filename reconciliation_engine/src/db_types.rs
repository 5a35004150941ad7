use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mps_common::UsdAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
/// The merchant-generated order identifier. Globally unique; generated as a timestamp plus a random suffix so that
/// two process instances can never mint the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Mint a fresh order id: `ORDER-<unix millis>-<4 random bytes as hex>`.
    pub fn generate() -> Self {
        Self(format!("ORDER-{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       InvoiceId        ------------------------------------------------------
/// The gateway-assigned invoice identifier. One order maps to at most one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub String);

impl InvoiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InvoiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------        UserId         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// The order has been created and no (or insufficient) funds have been received.
    Pending,
    /// Payment has been seen on-chain but does not have enough confirmations yet.
    Paid,
    /// The payment has reached sufficient on-chain confirmations. Terminal; the only state that credits balance.
    Confirmed,
    /// The order expired before payment arrived. Terminal.
    Expired,
    /// The payment failed. Terminal.
    Failed,
    /// The order was cancelled by the user or an operator. Terminal.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::Pending | OrderStatusType::Paid)
    }

    /// The order lifecycle transition table. `Pending` may move to any other state (a lone `confirmed`
    /// notification can be the first to arrive), `Paid` may settle or fail, and terminal states never move.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        match (self, next) {
            (Pending, Paid | Confirmed | Expired | Failed | Cancelled) => true,
            (Paid, Confirmed | Failed) => true,
            (_, _) => false,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Pending => "pending",
            OrderStatusType::Paid => "paid",
            OrderStatusType::Confirmed => "confirmed",
            OrderStatusType::Expired => "expired",
            OrderStatusType::Failed => "failed",
            OrderStatusType::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for OrderStatusType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "confirmed" => Ok(Self::Confirmed),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
/// The merchant-side record of one payment attempt. Orders are never deleted; they are only transitioned along
/// the lifecycle or marked cancelled. Mutation happens exclusively inside the ledger's per-order critical section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub invoice_id: Option<InvoiceId>,
    /// The deposit address assigned by the gateway, if known.
    pub address: Option<String>,
    /// The gateway's unique payment id for this invoice, if known.
    pub payment_id: Option<String>,
    /// The requested amount, in crypto units of `currency`.
    pub amount: f64,
    /// The exact amount the payer must transfer (the gateway disambiguates deposits by unique amounts).
    pub amount_to_pay: Option<f64>,
    pub currency: String,
    pub network: String,
    pub status: OrderStatusType,
    /// Cumulative amount received so far, in crypto units of `currency`.
    pub amount_received: f64,
    /// The USD amount credited to the user's balance. Set exactly once, on the transition into `Confirmed`.
    pub usd_credited: Option<UsdAmount>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
/// The payload supplied by the order-creation collaborator when a payment intent is requested. The ledger seeds a
/// `pending` [`Order`] from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub invoice_id: Option<InvoiceId>,
    pub address: Option<String>,
    pub payment_id: Option<String>,
    pub amount: f64,
    pub amount_to_pay: Option<f64>,
    pub currency: String,
    pub network: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, user_id: UserId, amount: f64, currency: &str, network: &str) -> Self {
        Self {
            order_id,
            user_id,
            invoice_id: None,
            address: None,
            payment_id: None,
            amount,
            amount_to_pay: None,
            currency: currency.to_string(),
            network: network.to_string(),
            expires_at: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transition_table_matches_lifecycle() {
        use OrderStatusType::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Expired));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Confirmed));
        assert!(Paid.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Expired));
        assert!(!Confirmed.can_transition_to(Paid));
        assert!(!Confirmed.can_transition_to(Confirmed));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Paid));
        for s in [Confirmed, Expired, Failed, Cancelled] {
            assert!(s.is_terminal());
        }
        assert!(!Pending.is_terminal());
        assert!(!Paid.is_terminal());
    }

    #[test]
    fn order_ids_are_unique() {
        let a = OrderId::generate();
        let b = OrderId::generate();
        assert!(a.as_str().starts_with("ORDER-"));
        assert_ne!(a, b);
    }

    #[test]
    fn status_round_trips_through_serde() {
        let status: OrderStatusType = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(status, OrderStatusType::Confirmed);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"confirmed\"");
        assert_eq!("paid".parse::<OrderStatusType>().unwrap(), OrderStatusType::Paid);
        assert!("Paid".parse::<OrderStatusType>().is_err());
    }
}
