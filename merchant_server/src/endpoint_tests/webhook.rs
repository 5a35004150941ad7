use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use mps_common::UsdAmount;
use reconciliation_engine::{
    db_types::{OrderId, OrderStatusType, UserId},
    events::EventProducers,
    traits::PaymentLedger,
    MemoryLedger,
    ReconciliationApi,
};

use super::helpers::{seed_order, webhook_secret};
use crate::{
    middleware::SignatureMiddlewareFactory,
    routes::IncomingPaymentNotificationRoute,
    signature::{SignatureVerifier, SIGNATURE_HEADER},
};

fn confirmed_payload(invoice_id: &str, order_id: &str) -> String {
    serde_json::json!({
        "event": "payment.confirmed",
        "invoice_id": invoice_id,
        "merchant_order_id": order_id,
        "status": "confirmed",
        "amount_received": 100.0,
        "currency": "USDT",
        "usd_amount": 99.8,
    })
    .to_string()
}

fn signed_request(body: String, signature: &str) -> actix_http::Request {
    TestRequest::post()
        .uri("/webhook/payment")
        .insert_header((SIGNATURE_HEADER, signature))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request()
}

async fn webhook_app(
    ledger: MemoryLedger,
) -> impl actix_web::dev::Service<actix_http::Request, Response = actix_web::dev::ServiceResponse, Error = actix_web::Error>
{
    let api = ReconciliationApi::new(ledger, EventProducers::default());
    test::init_service(
        App::new().app_data(web::Data::new(api)).service(
            web::scope("/webhook")
                .wrap(SignatureMiddlewareFactory::new(webhook_secret()))
                .service(IncomingPaymentNotificationRoute::<MemoryLedger>::new()),
        ),
    )
    .await
}

#[actix_web::test]
async fn valid_signature_credits_exactly_once() {
    let _ = env_logger::try_init();
    let ledger = MemoryLedger::new();
    let api = ReconciliationApi::new(ledger.clone(), EventProducers::default());
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    let app = webhook_app(ledger.clone()).await;

    let body = confirmed_payload("INV-1", "ORDER-1");
    let signature = SignatureVerifier::new(webhook_secret()).sign(body.as_bytes());
    let resp = test::call_service(&app, signed_request(body.clone(), &signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["received"], true);
    let balance = ledger.user_balance(&UserId::from("U1")).await.unwrap();
    assert_eq!(balance, UsdAmount::from_cents(9980));

    // The gateway retries deliveries. The replay is acknowledged but credits nothing.
    let resp = test::call_service(&app, signed_request(body, &signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let balance = ledger.user_balance(&UserId::from("U1")).await.unwrap();
    assert_eq!(balance, UsdAmount::from_cents(9980));
}

#[actix_web::test]
async fn invalid_signature_is_rejected_before_the_ledger() {
    let _ = env_logger::try_init();
    let ledger = MemoryLedger::new();
    let api = ReconciliationApi::new(ledger.clone(), EventProducers::default());
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    let app = webhook_app(ledger.clone()).await;

    let body = confirmed_payload("INV-1", "ORDER-1");
    let forged = "0".repeat(64);
    let err = test::try_call_service(&app, signed_request(body, &forged)).await.expect_err("Expected a rejection");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    // Nothing reached the engine.
    let order = ledger.fetch_order_by_order_id(&OrderId::from("ORDER-1".to_string())).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(ledger.user_balance(&UserId::from("U1")).await.unwrap(), UsdAmount::default());
}

#[actix_web::test]
async fn missing_signature_header_is_rejected() {
    let _ = env_logger::try_init();
    let app = webhook_app(MemoryLedger::new()).await;
    let req = TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(confirmed_payload("INV-1", "ORDER-1"))
        .to_request();
    let err = test::try_call_service(&app, req).await.expect_err("Expected a rejection");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn tampered_body_is_rejected() {
    let _ = env_logger::try_init();
    let ledger = MemoryLedger::new();
    let api = ReconciliationApi::new(ledger.clone(), EventProducers::default());
    seed_order(&api, "ORDER-1", "U1", 100.0).await;
    let app = webhook_app(ledger.clone()).await;

    let body = confirmed_payload("INV-1", "ORDER-1");
    let signature = SignatureVerifier::new(webhook_secret()).sign(body.as_bytes());
    let tampered = body.replace("99.8", "9999.8");
    let err =
        test::try_call_service(&app, signed_request(tampered, &signature)).await.expect_err("Expected a rejection");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(ledger.user_balance(&UserId::from("U1")).await.unwrap(), UsdAmount::default());
}

#[actix_web::test]
async fn unknown_invoice_is_still_acknowledged() {
    // Authenticated deliveries for orders we do not know must return 200 so the gateway stops retrying.
    let _ = env_logger::try_init();
    let app = webhook_app(MemoryLedger::new()).await;
    let body = confirmed_payload("INV-OTHER-INSTANCE", "ORDER-OTHER-INSTANCE");
    let signature = SignatureVerifier::new(webhook_secret()).sign(body.as_bytes());
    let resp = test::call_service(&app, signed_request(body, &signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn malformed_body_with_a_valid_signature_is_a_bad_request() {
    let _ = env_logger::try_init();
    let app = webhook_app(MemoryLedger::new()).await;
    let body = r#"{"event": "payment.confirmed", "#.to_string();
    let signature = SignatureVerifier::new(webhook_secret()).sign(body.as_bytes());
    // The signature is valid, so the middleware lets it through; the Json extractor rejects it.
    let resp = test::call_service(&app, signed_request(body, &signature)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
