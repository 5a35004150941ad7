use mps_common::UsdAmount;

use crate::db_types::{InvoiceId, Order, OrderId, OrderStatusType};

/// The result of applying a notification to the ledger.
///
/// Only `Applied` changed anything. `Stale` and `UnknownOrder` are the expected outcomes of at-least-once
/// delivery and cross-instance traffic respectively; neither is an error, and callers answer the transport with
/// success in both cases.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The event extended the order's lifecycle. `credited` is set iff this apply moved the order into
    /// `Confirmed` and the user's balance was incremented.
    Applied { order: Order, credited: Option<UsdAmount> },
    /// The event does not extend the order's current state: a re-delivery, an out-of-order arrival, or an
    /// unexpected transition. Discarded as a no-op.
    Stale {
        order_id: OrderId,
        current: OrderStatusType,
        proposed: OrderStatusType,
    },
    /// Neither the embedded order id nor the invoice index resolves to an order this instance knows about.
    UnknownOrder { invoice_id: InvoiceId },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }

    /// The amount credited by this apply, if it confirmed the order.
    pub fn credited(&self) -> Option<UsdAmount> {
        match self {
            ApplyOutcome::Applied { credited, .. } => *credited,
            _ => None,
        }
    }

    /// The post-apply order snapshot, if the event was applied.
    pub fn into_order(self) -> Option<Order> {
        match self {
            ApplyOutcome::Applied { order, .. } => Some(order),
            _ => None,
        }
    }
}
