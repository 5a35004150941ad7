//! The in-memory ledger backend.
//!
//! Storage technology is deliberately pluggable behind [`PaymentLedger`]; this backend keeps everything in one
//! process-local map guarded by a single async mutex. Every trait method takes the lock exactly once, so the
//! resolve → transition-check → mutate → credit sequence is atomic with respect to all other ledger calls, which
//! is the property the reconciliation contract requires. Lock hold times are short (pure map operations, no I/O).
use std::{
    collections::HashMap,
    sync::Arc,
};

use chrono::{Duration, Utc};
use log::*;
use mps_common::UsdAmount;
use tokio::sync::Mutex;

use crate::{
    db_types::{InvoiceId, NewOrder, Order, OrderId, OrderStatusType, UserId},
    events::NotificationEvent,
    traits::{ApplyOutcome, LedgerError, PaymentLedger},
};

#[derive(Default)]
struct LedgerInner {
    orders: HashMap<OrderId, Order>,
    invoice_index: HashMap<InvoiceId, OrderId>,
    balances: HashMap<UserId, UsdAmount>,
}

#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<LedgerInner>>,
    /// When `usd_amount` is missing on a confirming event, fall back to crediting `amount_received` as if it
    /// were USD. This mirrors the gateway's legacy behaviour; see `with_usd_fallback` to disable it.
    usd_fallback: bool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(LedgerInner::default())), usd_fallback: true }
    }

    /// The `amount_received`-as-USD fallback conflates currency units and only holds for USD-pegged deposits.
    /// Deployments that accept anything else should disable it; a confirmation without a `usd_amount` then
    /// still transitions the order but credits nothing (with a warning logged).
    pub fn with_usd_fallback(mut self, enabled: bool) -> Self {
        self.usd_fallback = enabled;
        self
    }
}

impl PaymentLedger for MemoryLedger {
    async fn seed_order(&self, order: NewOrder) -> Result<Order, LedgerError> {
        let mut inner = self.inner.lock().await;
        if inner.orders.contains_key(&order.order_id) {
            return Err(LedgerError::OrderAlreadyExists(order.order_id));
        }
        let now = Utc::now();
        let record = Order {
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            invoice_id: order.invoice_id.clone(),
            address: order.address,
            payment_id: order.payment_id,
            amount: order.amount,
            amount_to_pay: order.amount_to_pay,
            currency: order.currency,
            network: order.network,
            status: OrderStatusType::Pending,
            amount_received: 0.0,
            usd_credited: None,
            expires_at: order.expires_at,
            created_at: now,
            updated_at: now,
        };
        if let Some(invoice_id) = order.invoice_id {
            inner.invoice_index.insert(invoice_id, order.order_id.clone());
        }
        inner.orders.insert(order.order_id, record.clone());
        Ok(record)
    }

    async fn apply_notification(&self, event: &NotificationEvent) -> Result<ApplyOutcome, LedgerError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        // Resolve the owning order: embedded order id first, invoice index second.
        let order_id = match event.order_id.as_ref().filter(|oid| inner.orders.contains_key(*oid)) {
            Some(oid) => oid.clone(),
            None => match inner.invoice_index.get(&event.invoice_id) {
                Some(oid) => oid.clone(),
                None => return Ok(ApplyOutcome::UnknownOrder { invoice_id: event.invoice_id.clone() }),
            },
        };
        // First sighting of this invoice id: record the mapping for events that arrive without an order id.
        inner.invoice_index.entry(event.invoice_id.clone()).or_insert_with(|| order_id.clone());
        let usd_fallback = self.usd_fallback;
        let order = inner.orders.get_mut(&order_id).ok_or_else(|| {
            // The index always points at a live order; orders are never deleted.
            LedgerError::StorageError(format!("invoice index points at missing order {order_id}"))
        })?;
        if order.invoice_id.is_none() {
            order.invoice_id = Some(event.invoice_id.clone());
        }
        let target = event.status;
        if !order.status.can_transition_to(target) {
            return Ok(ApplyOutcome::Stale { order_id, current: order.status, proposed: target });
        }
        order.status = target;
        order.amount_received = event.amount_received;
        order.updated_at = Utc::now();
        let mut credited = None;
        if target == OrderStatusType::Confirmed {
            let amount = event.usd_amount.or_else(|| {
                if usd_fallback {
                    UsdAmount::try_from(event.amount_received).ok()
                } else {
                    None
                }
            });
            match amount {
                Some(usd) => {
                    order.usd_credited = Some(usd);
                    credited = Some(usd);
                    let user = order.user_id.clone();
                    let balance = inner.balances.entry(user).or_default();
                    *balance += usd;
                },
                None => {
                    warn!(
                        "📒️ Order {order_id} confirmed without a usd_amount and the USD fallback is disabled. \
                         The order is confirmed but no balance was credited."
                    );
                },
            }
        }
        let order = inner.orders[&order_id].clone();
        Ok(ApplyOutcome::Applied { order, credited })
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        let mut inner = self.inner.lock().await;
        let order = inner.orders.get_mut(order_id).ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Pending {
            return Err(LedgerError::OrderNotCancellable(order_id.clone(), order.status));
        }
        order.status = OrderStatusType::Cancelled;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn expire_old_orders(&self, unpaid_limit: Duration) -> Result<Vec<Order>, LedgerError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut expired = Vec::new();
        for order in inner.orders.values_mut() {
            if order.status != OrderStatusType::Pending {
                continue;
            }
            let past_expiry = order.expires_at.map(|t| t <= now).unwrap_or(false);
            let abandoned = now - order.created_at > unpaid_limit;
            if past_expiry || abandoned {
                order.status = OrderStatusType::Expired;
                order.updated_at = now;
                expired.push(order.clone());
            }
        }
        Ok(expired)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(order_id).cloned())
    }

    async fn fetch_order_by_invoice_id(&self, invoice_id: &InvoiceId) -> Result<Option<Order>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner.invoice_index.get(invoice_id).and_then(|oid| inner.orders.get(oid)).cloned())
    }

    async fn user_balance(&self, user_id: &UserId) -> Result<UsdAmount, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner.balances.get(user_id).copied().unwrap_or_default())
    }

    async fn fetch_orders(&self, user_id: Option<&UserId>) -> Result<Vec<Order>, LedgerError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| user_id.map(|u| &o.user_id == u).unwrap_or(true))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
