//! The storage seam for the reconciliation engine.
//!
//! Backends implement [`PaymentLedger`] to act as the authoritative store of orders, the invoice index and user
//! balances. The engine ships with the in-memory [`crate::MemoryLedger`]; a durable backend only has to honour
//! the same contract, most importantly that [`PaymentLedger::apply_notification`] is atomic per order.
mod data_objects;
mod ledger;

pub use data_objects::ApplyOutcome;
pub use ledger::{LedgerError, PaymentLedger};
