//! The REST client for the payment gateway's API.
//!
//! Every call carries the merchant `X-API-Key` and the per-site `X-Site-Key` headers; the gateway wraps response
//! bodies in a `{ "success": ..., "data": ... }` envelope which is unwrapped here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use mps_common::UsdAmount;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
    StatusCode,
};
use reconciliation_engine::db_types::{InvoiceId, OrderId, OrderStatusType};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::{config::GatewayConfig, data_objects::CreateInvoiceParams, errors::ServerError};

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
    callback_url: Option<String>,
}

/// An invoice record as the gateway reports it, from both invoice creation and status queries.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInvoice {
    pub invoice_id: InvoiceId,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub amount_to_pay: Option<f64>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub status: Option<OrderStatusType>,
    #[serde(default)]
    pub amount_received: f64,
    #[serde(default)]
    pub usd_amount: Option<UsdAmount>,
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    #[allow(dead_code)]
    success: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    amount: f64,
    currency: &'a str,
    network: &'a str,
    merchant_order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
}

impl GatewayClient {
    pub fn try_new(config: &GatewayConfig) -> Result<Self, ServerError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway url: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(config.api_key.reveal())
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway API key: {e}")))?;
        headers.insert("X-API-Key", api_key);
        let site_key = HeaderValue::from_str(config.site_key.reveal())
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway site key: {e}")))?;
        headers.insert("X-Site-Key", site_key);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not build gateway client: {e}")))?;
        Ok(Self { client, base_url, callback_url: config.callback_url.clone() })
    }

    pub async fn create_invoice(
        &self,
        order_id: &OrderId,
        params: &CreateInvoiceParams,
    ) -> Result<GatewayInvoice, ServerError> {
        let body = CreateInvoiceBody {
            amount: params.amount,
            currency: &params.currency,
            network: &params.network,
            merchant_order_id: order_id.as_str(),
            description: params.description.as_deref(),
            callback_url: self.callback_url.as_deref(),
            expires_in: params.expires_in,
        };
        let url = self.endpoint("/api/v1/invoices")?;
        debug!("🌐️ Creating invoice for order {order_id} at {url}");
        let response = self.client.post(url).json(&body).send().await.map_err(|e| {
            warn!("🌐️ Invoice creation request failed: {e}");
            ServerError::GatewayError(e.to_string())
        })?;
        self.unwrap_envelope(response).await
    }

    pub async fn invoice_status(&self, invoice_id: &InvoiceId) -> Result<GatewayInvoice, ServerError> {
        let url = self.endpoint(&format!("/api/v1/invoices/{invoice_id}"))?;
        debug!("🌐️ Fetching status for invoice {invoice_id}");
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("🌐️ Invoice status request failed: {e}");
            ServerError::GatewayError(e.to_string())
        })?;
        self.unwrap_envelope(response).await
    }

    /// Ask the gateway to cancel an invoice. A 404 counts as success; the invoice may already be gone.
    pub async fn cancel_invoice(&self, invoice_id: &InvoiceId) -> Result<(), ServerError> {
        let url = self.endpoint(&format!("/api/v1/invoices/{invoice_id}/cancel"))?;
        debug!("🌐️ Cancelling invoice {invoice_id}");
        let response = self.client.post(url).send().await.map_err(|e| {
            warn!("🌐️ Invoice cancel request failed: {e}");
            ServerError::GatewayError(e.to_string())
        })?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            warn!("🌐️ Gateway refused to cancel invoice {invoice_id}: {status}");
            Err(ServerError::GatewayError(format!("Gateway returned {status}")))
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServerError> {
        self.base_url.join(path).map_err(|e| ServerError::ConfigurationError(format!("Invalid gateway path: {e}")))
    }

    async fn unwrap_envelope<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, ServerError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServerError::NoRecordFound("The gateway does not know this invoice".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("🌐️ Gateway returned {status}: {body}");
            return Err(ServerError::GatewayError(format!("Gateway returned {status}")));
        }
        let envelope = response.json::<ApiEnvelope<T>>().await.map_err(|e| {
            warn!("🌐️ Could not parse gateway response: {e}");
            ServerError::GatewayError(format!("Unparseable gateway response: {e}"))
        })?;
        Ok(envelope.data)
    }
}
