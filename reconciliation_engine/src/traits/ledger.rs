use chrono::Duration;
use mps_common::UsdAmount;
use thiserror::Error;

use crate::{
    db_types::{InvoiceId, NewOrder, Order, OrderId, UserId},
    events::NotificationEvent,
    traits::ApplyOutcome,
};

/// This trait defines the behaviour of backends supporting the reconciliation engine.
///
/// This behaviour includes:
/// * Seeding new orders in `pending` state when a payment intent is created.
/// * Applying payment notifications from either channel, atomically per order.
/// * Read-only snapshot queries over orders and user balances.
///
/// The contract that everything else leans on: `apply_notification` executes the whole
/// resolve → transition-check → mutate → credit sequence as a single atomic unit for the order involved.
/// Two notifications for the same order racing in from different channels must serialize; the transition check
/// may never be evaluated against state that another in-flight apply is about to change. Balance crediting
/// happens inside that same critical section, so a `pending → confirmed` transition can never credit twice.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone + Send + Sync {
    /// Seed a new order in `pending` state. If the gateway invoice id is already known it is recorded in the
    /// invoice index at the same time.
    ///
    /// Returns the stored order record, or `OrderAlreadyExists` if the order id has been seen before.
    async fn seed_order(&self, order: NewOrder) -> Result<Order, LedgerError>;

    /// Apply a payment notification. This is the single entry point for both the webhook and the stream paths.
    ///
    /// * The owning order is resolved by the embedded order id, falling back to the invoice index.
    /// * A previously unseen invoice id is recorded in the index as a side effect.
    /// * Events that do not extend the order's state per the transition table are discarded as `Stale`.
    /// * The user's balance is credited exactly once, on the transition into `confirmed`, using the event's
    ///   `usd_amount` (or the documented `amount_received` fallback when enabled).
    ///
    /// Stale and unknown-order outcomes are not errors; see [`ApplyOutcome`].
    fn apply_notification(
        &self,
        event: &NotificationEvent,
    ) -> impl std::future::Future<Output = Result<ApplyOutcome, LedgerError>> + Send;

    /// Cancel a `pending` order on behalf of a user or operator. Any other state is refused.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, LedgerError>;

    /// Expire stale `pending` orders: those whose `expires_at` has passed, and those that have gone unpaid for
    /// longer than `unpaid_limit` since creation. Returns the orders that were expired.
    fn expire_old_orders(
        &self,
        unpaid_limit: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<Order>, LedgerError>> + Send;

    /// Fetch a snapshot of the order with the given merchant order id.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError>;

    /// Fetch a snapshot of the order owning the given gateway invoice id.
    async fn fetch_order_by_invoice_id(&self, invoice_id: &InvoiceId) -> Result<Option<Order>, LedgerError>;

    /// The user's cumulative confirmed balance, in USD.
    async fn user_balance(&self, user_id: &UserId) -> Result<UsdAmount, LedgerError>;

    /// Snapshots of all orders, newest first, optionally restricted to one user.
    async fn fetch_orders(&self, user_id: Option<&UserId>) -> Result<Vec<Order>, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Cannot seed order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} is in state {1} and cannot be cancelled")]
    OrderNotCancellable(OrderId, crate::db_types::OrderStatusType),
    #[error("The backing store failed: {0}")]
    StorageError(String),
}
