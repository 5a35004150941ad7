use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use reconciliation_engine::{
    events::{EventHandlers, EventHooks, EventProducers, NotificationEvent, OrderAnnulledEvent, OrderConfirmedEvent},
    traits::PaymentLedger,
    MemoryLedger,
    ReconciliationApi,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    gateway::GatewayClient,
    middleware::SignatureMiddlewareFactory,
    routes::{
        health,
        CancelOrderRoute,
        CreateInvoiceRoute,
        IncomingPaymentNotificationRoute,
        PaymentStatusRoute,
        UserBalanceRoute,
        UserPaymentsRoute,
    },
    stream::spawn_stream_client,
};

const EVENT_BUFFER_SIZE: usize = 100;
const STREAM_BUFFER_SIZE: usize = 100;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let ledger = MemoryLedger::new().with_usd_fallback(config.usd_fallback);
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, reconciliation_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Some(stream_config) = config.stream.clone() {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);
        spawn_stream_client(stream_config, tx, shutdown_rx);
        spawn_stream_consumer(ledger.clone(), producers.clone(), rx);
    }
    start_expiry_worker(ledger.clone(), producers.clone(), config.unpaid_order_timeout);
    let srv = create_server_instance(config, ledger, producers)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    let _ = shutdown_tx.send(true);
    result
}

/// The hooks the server subscribes to reconciliation outcomes. For now they produce the audit trail for
/// settlements and annulments; fulfilment integrations hang off the same hooks.
fn reconciliation_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_confirmed(|ev: OrderConfirmedEvent| {
        Box::pin(async move {
            match ev.credited {
                Some(usd) => {
                    info!("📬️ Order {} settled. {usd} credited to user {}.", ev.order.order_id, ev.order.user_id)
                },
                None => info!(
                    "📬️ Order {} settled for user {} with nothing to credit.",
                    ev.order.order_id, ev.order.user_id
                ),
            }
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_order_annulled(|ev: OrderAnnulledEvent| {
        Box::pin(async move {
            info!("📬️ Order {} for user {} is closed as {}.", ev.order.order_id, ev.order.user_id, ev.status);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

/// Drains stream notifications into the reconciliation engine. Runs until the stream client drops the sender.
fn spawn_stream_consumer<B: PaymentLedger + 'static>(
    ledger: B,
    producers: EventProducers,
    mut events: mpsc::Receiver<NotificationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = ReconciliationApi::new(ledger, producers);
        while let Some(event) = events.recv().await {
            if let Err(e) = api.apply(&event).await {
                error!("📨️ Could not apply stream notification. {e}");
            }
        }
        debug!("📨️ Stream notification consumer stopped");
    })
}

pub fn create_server_instance<B: PaymentLedger + 'static>(
    config: ServerConfig,
    ledger: B,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let gateway = GatewayClient::try_new(&config.gateway)?;
    let srv = HttpServer::new(move || {
        let api = ReconciliationApi::new(ledger.clone(), producers.clone());
        let webhook_scope = web::scope("/webhook")
            .wrap(SignatureMiddlewareFactory::new(config.webhook_secret.clone()))
            .service(IncomingPaymentNotificationRoute::<B>::new());
        let api_scope = web::scope("/api")
            .service(CreateInvoiceRoute::<B>::new())
            .service(PaymentStatusRoute::<B>::new())
            .service(UserBalanceRoute::<B>::new())
            .service(UserPaymentsRoute::<B>::new())
            .service(CancelOrderRoute::<B>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mps::access_log"))
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(gateway.clone()))
            .service(health)
            .service(webhook_scope)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
