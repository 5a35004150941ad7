use std::fmt::Debug;

use chrono::Duration;
use log::*;
use mps_common::UsdAmount;

use crate::{
    db_types::{InvoiceId, NewOrder, Order, OrderId, OrderStatusType, UserId},
    events::{EventProducers, NotificationEvent, OrderAnnulledEvent, OrderConfirmedEvent},
    traits::{ApplyOutcome, LedgerError, PaymentLedger},
};

/// `ReconciliationApi` is the primary API for handling order and notification flows. Both inbound channels
/// (webhook and stream) funnel their normalised [`NotificationEvent`]s through [`Self::apply`]; everything that
/// touches the ledger goes through here.
pub struct ReconciliationApi<B> {
    ledger: B,
    producers: EventProducers,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(ledger: B, producers: EventProducers) -> Self {
        Self { ledger, producers }
    }
}

impl<B> ReconciliationApi<B>
where B: PaymentLedger
{
    /// Seed a brand-new order from the order-creation collaborator's payload. The order starts in `pending`
    /// state; re-seeding an existing order id is an error.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<Order, LedgerError> {
        let record = self.ledger.seed_order(order).await?;
        debug!(
            "🔄️📦️ Order [{}] seeded for user {} ({} {} on {})",
            record.order_id, record.user_id, record.amount, record.currency, record.network
        );
        Ok(record)
    }

    /// Apply a payment notification from either channel.
    ///
    /// This call is idempotent: re-delivery of an already-applied event is a logged no-op. Discards (stale
    /// duplicates, unknown references) are part of the contract and are not surfaced as errors. Hook dispatch
    /// runs after the ledger's critical section has been released.
    pub async fn apply(&self, event: &NotificationEvent) -> Result<ApplyOutcome, LedgerError> {
        let outcome = self.ledger.apply_notification(event).await?;
        match &outcome {
            ApplyOutcome::Applied { order, credited } => {
                debug!(
                    "🔄️📬️ [{}] {} applied to order {}: now {}",
                    event.channel, event.event, order.order_id, order.status
                );
                match order.status {
                    OrderStatusType::Confirmed => {
                        if let Some(usd) = credited {
                            info!(
                                "🔄️💰️ Order {} confirmed. Credited {usd} to user {}.",
                                order.order_id, order.user_id
                            );
                        }
                        self.call_order_confirmed_hook(order, *credited).await;
                    },
                    OrderStatusType::Expired | OrderStatusType::Failed | OrderStatusType::Cancelled => {
                        self.call_order_annulled_hook(order).await;
                    },
                    _ => {},
                }
            },
            ApplyOutcome::Stale { order_id, current, proposed } => {
                if current.is_terminal() && !proposed.is_terminal() {
                    // A would-be regression (e.g. confirmed → paid) is worth a warning; plain duplicates are not.
                    warn!(
                        "🔄️📬️ [{}] Ignoring {} for order {order_id}: would move {current} back to {proposed}",
                        event.channel, event.event
                    );
                } else {
                    debug!(
                        "🔄️📬️ [{}] Discarding stale {} for order {order_id} ({current} ↛ {proposed})",
                        event.channel, event.event
                    );
                }
            },
            ApplyOutcome::UnknownOrder { invoice_id } => {
                // Possibly another instance's order, or one that predates this instance's memory.
                debug!(
                    "🔄️📬️ [{}] No order found for invoice {invoice_id}; notification discarded",
                    event.channel
                );
            },
        }
        Ok(outcome)
    }

    /// Cancel a pending order on behalf of a user or operator.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        let order = self.ledger.cancel_order(order_id).await?;
        info!("🔄️🚫️ Order {} cancelled", order.order_id);
        self.call_order_annulled_hook(&order).await;
        Ok(order)
    }

    /// Expire stale pending orders. Returns the orders that were expired.
    pub async fn expire_old_orders(&self, unpaid_limit: Duration) -> Result<Vec<Order>, LedgerError> {
        let expired = self.ledger.expire_old_orders(unpaid_limit).await?;
        for order in &expired {
            self.call_order_annulled_hook(order).await;
        }
        Ok(expired)
    }

    pub async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        self.ledger.fetch_order_by_order_id(order_id).await
    }

    pub async fn fetch_order_by_invoice_id(&self, invoice_id: &InvoiceId) -> Result<Option<Order>, LedgerError> {
        self.ledger.fetch_order_by_invoice_id(invoice_id).await
    }

    pub async fn user_balance(&self, user_id: &UserId) -> Result<UsdAmount, LedgerError> {
        self.ledger.user_balance(user_id).await
    }

    pub async fn fetch_orders(&self, user_id: Option<&UserId>) -> Result<Vec<Order>, LedgerError> {
        self.ledger.fetch_orders(user_id).await
    }

    async fn call_order_confirmed_hook(&self, order: &Order, credited: Option<UsdAmount>) {
        for emitter in &self.producers.order_confirmed_producer {
            trace!("🔄️📦️ Notifying order confirmed hook subscribers");
            let event = OrderConfirmedEvent { order: order.clone(), credited };
            emitter.publish_event(event).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            trace!("🔄️📦️ Notifying order annulled hook subscribers");
            emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
        }
    }

    pub fn ledger(&self) -> &B {
        &self.ledger
    }
}
