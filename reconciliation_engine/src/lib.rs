//! Reconciliation Engine
//!
//! The reconciliation engine merges asynchronous payment notifications arriving over two independent, unreliable
//! channels (a signed webhook push and a persistent notification stream) into one consistent view of each order's
//! lifecycle, and credits a user's running USD balance exactly once per confirmed payment, despite at-least-once
//! delivery, duplicates, re-ordering and channel outages.
//!
//! The library is divided into three main sections:
//! 1. The ledger seam ([`mod@traits`]). The [`traits::PaymentLedger`] trait defines the storage contract: seeding
//!    orders, applying notifications atomically, and read-only snapshot queries. The shipped backend is the
//!    in-memory [`MemoryLedger`]; any store that can apply a notification as a single atomic unit per order can
//!    act as a backend.
//! 2. The reconciliation public API ([`mod@reconciliation`]). [`ReconciliationApi`] is what transports call: it
//!    delegates to the ledger, classifies discards (stale duplicates, unknown references) as the no-ops they are,
//!    and fires event hooks once an order is confirmed or annulled.
//! 3. Events ([`mod@events`]). The channel-agnostic [`events::NotificationEvent`] shape that both inbound paths
//!    normalise into, plus a small actor-style hook system for subscribing to reconciliation outcomes.
mod memory;

pub mod db_types;
pub mod events;
pub mod traits;

mod reconciliation;

pub use memory::MemoryLedger;
pub use reconciliation::ReconciliationApi;
