use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use reconciliation_engine::{
    db_types::{InvoiceId, NewOrder, OrderId, OrderStatusType, UserId},
    events::{Channel, EventKind, NotificationEvent},
    MemoryLedger,
    ReconciliationApi,
};

use super::helpers::{offline_gateway, seed_order, test_api};
use crate::routes::{CancelOrderRoute, CreateInvoiceRoute, PaymentStatusRoute, UserBalanceRoute, UserPaymentsRoute};

async fn api_app(
    api: ReconciliationApi<MemoryLedger>,
) -> impl actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>
{
    test::init_service(
        App::new().app_data(web::Data::new(api)).app_data(web::Data::new(offline_gateway())).service(
            web::scope("/api")
                .service(CreateInvoiceRoute::<MemoryLedger>::new())
                .service(PaymentStatusRoute::<MemoryLedger>::new())
                .service(UserBalanceRoute::<MemoryLedger>::new())
                .service(UserPaymentsRoute::<MemoryLedger>::new())
                .service(CancelOrderRoute::<MemoryLedger>::new()),
        ),
    )
    .await
}

fn confirm_event(invoice_id: &str, order_id: &str, usd: f64) -> NotificationEvent {
    NotificationEvent {
        event: EventKind::Confirmed,
        invoice_id: InvoiceId::from(invoice_id.to_string()),
        order_id: Some(OrderId::from(order_id.to_string())),
        user_id: None,
        status: OrderStatusType::Confirmed,
        amount_received: 100.0,
        currency: "USDT".to_string(),
        usd_amount: Some(usd.try_into().unwrap()),
        fiat_amount: None,
        fiat_currency: None,
        metadata: serde_json::Value::Null,
        channel: Channel::Stream,
    }
}

#[actix_web::test]
async fn balance_reflects_confirmed_orders() {
    let _ = env_logger::try_init();
    let api = test_api();
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    api.apply(&confirm_event("INV-1", "ORDER-1", 99.8)).await.unwrap();
    let app = api_app(api).await;

    let req = TestRequest::get().uri("/api/users/U1/balance").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user_id"], "U1");
    assert_eq!(body["balance"], 99.8);
    assert_eq!(body["currency"], "USD");

    // A user with no confirmed orders has a zero balance, not a 404.
    let req = TestRequest::get().uri("/api/users/U2/balance").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["balance"], 0.0);
}

#[actix_web::test]
async fn payments_are_listed_per_user() {
    let _ = env_logger::try_init();
    let api = test_api();
    seed_order(&api, "ORDER-1", "U1", 10.0).await;
    seed_order(&api, "ORDER-2", "U1", 20.0).await;
    seed_order(&api, "ORDER-3", "U2", 30.0).await;
    let app = api_app(api).await;

    let req = TestRequest::get().uri("/api/users/U1/payments").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 2);
    let orders = body["orders"].as_array().unwrap();
    assert!(orders.iter().all(|o| o["user_id"] == "U1"));
}

#[actix_web::test]
async fn status_is_found_by_order_id_or_invoice_id() {
    let _ = env_logger::try_init();
    let api = test_api();
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    // Confirmed orders are terminal, so the handler serves the local snapshot without calling the gateway.
    api.apply(&confirm_event("INV-1", "ORDER-1", 99.8)).await.unwrap();
    let app = api_app(api).await;

    for id in ["ORDER-1", "INV-1"] {
        let req = TestRequest::get().uri(&format!("/api/payments/{id}/status")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["order_id"], "ORDER-1");
        assert_eq!(body["status"], "confirmed");
    }
}

#[actix_web::test]
async fn status_for_an_unknown_id_is_a_404() {
    let _ = env_logger::try_init();
    let app = api_app(test_api()).await;
    let req = TestRequest::get().uri("/api/payments/ORDER-MISSING/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn status_for_an_order_without_an_invoice_serves_the_local_snapshot() {
    // No invoice id means there is nothing to poll the gateway for.
    let _ = env_logger::try_init();
    let api = test_api();
    let order = NewOrder::new(OrderId::from("ORDER-1".to_string()), UserId::from("U1"), 50.0, "USDT", "tron");
    api.process_new_order(order).await.unwrap();
    let app = api_app(api).await;

    let req = TestRequest::get().uri("/api/payments/ORDER-1/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "pending");
}

#[actix_web::test]
async fn invoice_creation_rejects_nonsense_values() {
    // Field presence is serde's job; value checks have to refuse the request before the gateway sees it.
    let _ = env_logger::try_init();
    let app = api_app(test_api()).await;
    for body in [
        serde_json::json!({"user_id": "U1", "amount": 0.0, "currency": "USDT", "network": "tron"}),
        serde_json::json!({"user_id": "U1", "amount": -5.0, "currency": "USDT", "network": "tron"}),
        serde_json::json!({"user_id": "U1", "amount": 10.0, "currency": "", "network": "tron"}),
        serde_json::json!({"user_id": "U1", "amount": 10.0, "currency": "USDT", "network": "  "}),
        serde_json::json!({"user_id": "", "amount": 10.0, "currency": "USDT", "network": "tron"}),
    ] {
        let req = TestRequest::post().uri("/api/payments/create-invoice").set_json(&body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "accepted {body}");
    }
}

#[actix_web::test]
async fn pending_orders_can_be_cancelled_once() {
    let _ = env_logger::try_init();
    let api = test_api();
    seed_order(&api, "ORDER-1", "U1", 10.0).await;
    let app = api_app(api).await;

    let req = TestRequest::post().uri("/api/orders/ORDER-1/cancel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "cancelled");

    // Cancelled is terminal; a second cancel is refused.
    let req = TestRequest::post().uri("/api/orders/ORDER-1/cancel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn confirmed_orders_cannot_be_cancelled() {
    let _ = env_logger::try_init();
    let api = test_api();
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    api.apply(&confirm_event("INV-1", "ORDER-1", 99.8)).await.unwrap();
    let app = api_app(api).await;

    let req = TestRequest::post().uri("/api/orders/ORDER-1/cancel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = TestRequest::post().uri("/api/orders/ORDER-MISSING/cancel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
