use chrono::Duration;
use log::*;
use reconciliation_engine::{db_types::Order, events::EventProducers, traits::PaymentLedger, ReconciliationApi};
use tokio::task::JoinHandle;

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker<B: PaymentLedger + 'static>(
    ledger: B,
    producers: EventProducers,
    unpaid_expiry: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = ReconciliationApi::new(ledger, producers);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running order expiry job");
            match api.expire_old_orders(unpaid_expiry).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} orders expired: {}", expired.len(), order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("order_id: {} user_id: {}", o.order_id, o.user_id))
        .collect::<Vec<String>>()
        .join(", ")
}
