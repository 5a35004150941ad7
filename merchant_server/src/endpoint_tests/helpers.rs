use mps_common::Secret;
use reconciliation_engine::{
    db_types::{NewOrder, OrderId, UserId},
    events::EventProducers,
    MemoryLedger,
    ReconciliationApi,
};

use crate::{config::GatewayConfig, gateway::GatewayClient};

pub const TEST_SECRET: &str = "test-webhook-secret";

pub fn webhook_secret() -> Secret<String> {
    Secret::new(TEST_SECRET.to_string())
}

pub fn test_api() -> ReconciliationApi<MemoryLedger> {
    ReconciliationApi::new(MemoryLedger::new(), EventProducers::default())
}

/// A gateway client pointing at a black hole. Endpoint tests only exercise paths that never reach the gateway.
pub fn offline_gateway() -> GatewayClient {
    let config = GatewayConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: Secret::new("test-key".to_string()),
        site_key: Secret::new("test-site".to_string()),
        callback_url: None,
    };
    GatewayClient::try_new(&config).expect("Offline gateway config is valid")
}

pub async fn seed_order(api: &ReconciliationApi<MemoryLedger>, order_id: &str, user_id: &str, amount: f64) {
    let order = NewOrder::new(OrderId::from(order_id.to_string()), UserId::from(user_id), amount, "USDT", "tron");
    api.process_new_order(order).await.expect("Could not seed order");
}
