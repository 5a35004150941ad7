//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers which block the current thread will stall the worker that runs them, so anything that waits (the
//! ledger lock, gateway calls) is expressed as an async function and awaited.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use mps_common::USD_CURRENCY_CODE;
use reconciliation_engine::{
    db_types::{InvoiceId, NewOrder, Order, OrderId, UserId},
    events::{Channel, NotificationEvent},
    traits::PaymentLedger,
    ReconciliationApi,
};

use crate::{
    data_objects::{BalanceResponse, CreateInvoiceParams, InvoiceCreatedResponse, OrderList, WebhookAck},
    errors::ServerError,
    gateway::{GatewayClient, GatewayInvoice},
    signature::EVENT_HEADER,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $bound:ty) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>); }
        paste::paste! {
            impl<B> [<$name:camel Route>]<B> {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self {
                    Self(core::marker::PhantomData)
                }
            }
        }
        paste::paste! {
            impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
            where B: $bound + 'static
            {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name::<B>);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//------------------------------------------   Webhook intake  -------------------------------------------------
route!(incoming_payment_notification => Post "/payment" impl PaymentLedger);
/// Route handler for signed webhook deliveries from the payment gateway.
///
/// The signature middleware has already authenticated the request by the time this handler runs, so the only
/// failure left is an unparseable body. Outcomes that change nothing (stale duplicates, unknown invoices) are
/// still acknowledged with 200 so the gateway stops retrying; re-delivery is the gateway's job, idempotency is
/// ours.
pub async fn incoming_payment_notification<B: PaymentLedger>(
    req: HttpRequest,
    body: web::Json<NotificationEvent>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let event = body.into_inner().from_channel(Channel::Webhook);
    let header_kind = req.headers().get(EVENT_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("?");
    debug!("💻️ {} webhook ({header_kind}) received for invoice {}", event.event, event.invoice_id);
    api.apply(&event).await.map_err(|e| {
        error!("💻️ Could not apply webhook notification. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    Ok(HttpResponse::Ok().json(WebhookAck::ok()))
}

//------------------------------------------   Invoice creation  -----------------------------------------------
route!(create_invoice => Post "/payments/create-invoice" impl PaymentLedger);
/// Create an invoice on the gateway and seed the matching pending order.
///
/// The order id is minted here and passed to the gateway as `merchant_order_id`, so every later notification
/// can be traced back even if the invoice index has not seen the invoice yet.
pub async fn create_invoice<B: PaymentLedger>(
    body: web::Json<CreateInvoiceParams>,
    api: web::Data<ReconciliationApi<B>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    validate_invoice_params(&params)?;
    let order_id = OrderId::generate();
    info!(
        "💻️ Creating invoice for user {} ({} {} on {})",
        params.user_id, params.amount, params.currency, params.network
    );
    let invoice = gateway.create_invoice(&order_id, &params).await?;
    let order = NewOrder {
        order_id: order_id.clone(),
        user_id: params.user_id,
        invoice_id: Some(invoice.invoice_id.clone()),
        address: invoice.address.clone(),
        payment_id: invoice.payment_id.clone(),
        amount: params.amount,
        amount_to_pay: invoice.amount_to_pay,
        currency: params.currency.clone(),
        network: params.network.clone(),
        expires_at: invoice.expires_at,
    };
    let order = api.process_new_order(order).await.map_err(|e| {
        error!("💻️ Invoice {} was created on the gateway but the order could not be seeded. {e}", invoice.invoice_id);
        ServerError::BackendError(e.to_string())
    })?;
    info!("💻️ Invoice {} created for order {}", invoice.invoice_id, order.order_id);
    let response = InvoiceCreatedResponse {
        success: true,
        order_id: order.order_id,
        invoice_id: invoice.invoice_id,
        address: invoice.address,
        amount: params.amount,
        amount_to_pay: invoice.amount_to_pay,
        payment_id: invoice.payment_id,
        currency: params.currency,
        network: params.network,
        payment_url: invoice.payment_url,
        expires_at: invoice.expires_at,
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Serde only enforces field presence; the values still have to make sense before they reach the gateway.
fn validate_invoice_params(params: &CreateInvoiceParams) -> Result<(), ServerError> {
    if params.user_id.0.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("user_id must not be empty".to_string()));
    }
    if !params.amount.is_finite() || params.amount <= 0.0 {
        return Err(ServerError::InvalidRequestBody("amount must be a positive number".to_string()));
    }
    if params.currency.trim().is_empty() || params.network.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("currency and network must not be empty".to_string()));
    }
    Ok(())
}

//------------------------------------------   Payment status  -------------------------------------------------
route!(payment_status => Get "/payments/{id}/status" impl PaymentLedger);
/// Fetch the current state of a payment. The path id may be either a merchant order id or a gateway invoice id.
///
/// When the order is still live a fresh status is pulled from the gateway and pushed through the same apply
/// path the notification channels use, so a poll can never credit twice or move an order backwards. A gateway
/// failure degrades to the local snapshot.
pub async fn payment_status<B: PaymentLedger>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET payment status for {id}");
    let order = find_order(&id, &api).await?;
    let order = match refresh_from_gateway(&order, &api, &gateway).await {
        Some(updated) => updated,
        None => order,
    };
    Ok(HttpResponse::Ok().json(order))
}

async fn find_order<B: PaymentLedger>(id: &str, api: &ReconciliationApi<B>) -> Result<Order, ServerError> {
    let by_order_id = api.fetch_order_by_order_id(&OrderId::from(id.to_string())).await?;
    let order = match by_order_id {
        Some(order) => Some(order),
        None => api.fetch_order_by_invoice_id(&InvoiceId::from(id.to_string())).await?,
    };
    order.ok_or_else(|| ServerError::NoRecordFound(format!("No payment matches {id}")))
}

async fn refresh_from_gateway<B: PaymentLedger>(
    order: &Order,
    api: &ReconciliationApi<B>,
    gateway: &GatewayClient,
) -> Option<Order> {
    if order.status.is_terminal() {
        return None;
    }
    let invoice_id = order.invoice_id.as_ref()?;
    let invoice = match gateway.invoice_status(invoice_id).await {
        Ok(invoice) => invoice,
        Err(e) => {
            // Best effort. The local snapshot is still valid; the next notification will catch us up.
            warn!("💻️ Could not refresh invoice {invoice_id} from the gateway. {e}");
            return None;
        },
    };
    let event = poll_event(&invoice, order)?;
    match api.apply(&event).await {
        Ok(outcome) => outcome.into_order(),
        Err(e) => {
            warn!("💻️ Could not apply polled status for invoice {invoice_id}. {e}");
            None
        },
    }
}

/// Translate a polled gateway invoice into the same notification shape the push channels use.
fn poll_event(invoice: &GatewayInvoice, order: &Order) -> Option<NotificationEvent> {
    let status = invoice.status?;
    if status == order.status {
        return None;
    }
    Some(NotificationEvent {
        event: reconciliation_engine::events::EventKind::Other,
        invoice_id: invoice.invoice_id.clone(),
        order_id: Some(order.order_id.clone()),
        user_id: Some(order.user_id.clone()),
        status,
        amount_received: invoice.amount_received,
        currency: invoice.currency.clone(),
        usd_amount: invoice.usd_amount,
        fiat_amount: None,
        fiat_currency: None,
        metadata: serde_json::Value::Null,
        channel: Channel::Webhook,
    })
}

//------------------------------------------   User queries  ---------------------------------------------------
route!(user_balance => Get "/users/{user_id}/balance" impl PaymentLedger);
/// The user's cumulative confirmed balance, in USD.
pub async fn user_balance<B: PaymentLedger>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = UserId::from(path.into_inner());
    debug!("💻️ GET balance for {user_id}");
    let balance = api.user_balance(&user_id).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse { user_id, balance, currency: USD_CURRENCY_CODE.to_string() }))
}

route!(user_payments => Get "/users/{user_id}/payments" impl PaymentLedger);
pub async fn user_payments<B: PaymentLedger>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = UserId::from(path.into_inner());
    debug!("💻️ GET payments for {user_id}");
    let orders = api.fetch_orders(Some(&user_id)).await?;
    Ok(HttpResponse::Ok().json(OrderList::from(orders)))
}

//------------------------------------------   Cancellation  ---------------------------------------------------
route!(cancel_order => Post "/orders/{order_id}/cancel" impl PaymentLedger);
/// Cancel a pending order. Orders that have already seen funds are refused.
///
/// The ledger cancellation is authoritative; telling the gateway to drop the invoice is best effort, since a
/// notification for a cancelled order is discarded as stale anyway.
pub async fn cancel_order<B: PaymentLedger>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
    gateway: web::Data<GatewayClient>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    info!("💻️ Cancel order request for {order_id}");
    let order = api.cancel_order(&order_id).await.map_err(|e| {
        debug!("💻️ Could not cancel order. {e}");
        ServerError::from(e)
    })?;
    if let Some(invoice_id) = &order.invoice_id {
        if let Err(e) = gateway.cancel_invoice(invoice_id).await {
            warn!("💻️ Order {order_id} is cancelled locally but invoice {invoice_id} was not. {e}");
        }
    }
    Ok(HttpResponse::Ok().json(order))
}
