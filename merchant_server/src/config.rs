use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use mps_common::{parse_boolean_flag, Secret};

const DEFAULT_MPS_HOST: &str = "127.0.0.1";
const DEFAULT_MPS_PORT: u16 = 3000;
const DEFAULT_UNPAID_ORDER_TIMEOUT: Duration = Duration::hours(48);
const DEFAULT_PING_INTERVAL: StdDuration = StdDuration::from_secs(30);
const DEFAULT_RECONNECT_DELAY: StdDuration = StdDuration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The shared secret used to verify `X-Signature` headers on incoming webhook calls.
    pub webhook_secret: Secret<String>,
    /// The time before an unpaid order is considered expired and marked as such.
    pub unpaid_order_timeout: Duration,
    /// When `usd_amount` is missing on a confirming notification, credit `amount_received` as USD instead.
    pub usd_fallback: bool,
    pub gateway: GatewayConfig,
    /// Stream configuration. `None` when no stream URL is configured; the server then relies on webhooks alone.
    pub stream: Option<StreamConfig>,
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base url of the payment gateway REST API, e.g. "https://gateway.example.com".
    pub base_url: String,
    /// The merchant's API key, sent as `X-API-Key`.
    pub api_key: Secret<String>,
    /// The per-site key, sent as `X-Site-Key`. The gateway rejects API calls without it.
    pub site_key: Secret<String>,
    /// The url the gateway should POST webhook notifications back to, if the merchant wants to override the
    /// value configured on the gateway side.
    pub callback_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// The websocket endpoint, e.g. "wss://gateway.example.com/ws".
    pub url: String,
    /// The bearer token appended to the url as `?token=...`.
    pub token: Secret<String>,
    /// How often to send an application-level ping frame.
    pub ping_interval: StdDuration,
    /// How long to wait after a connection drops before dialling again.
    pub reconnect_delay: StdDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPS_HOST.to_string(),
            port: DEFAULT_MPS_PORT,
            webhook_secret: Secret::default(),
            unpaid_order_timeout: DEFAULT_UNPAID_ORDER_TIMEOUT,
            usd_fallback: true,
            gateway: GatewayConfig::default(),
            stream: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPS_HOST").ok().unwrap_or_else(|| DEFAULT_MPS_HOST.into());
        let port = env::var("MPS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPS_PORT. {e} Using the default, {DEFAULT_MPS_PORT}, instead."
                    );
                    DEFAULT_MPS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPS_PORT);
        let webhook_secret = env::var("MPS_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ MPS_WEBHOOK_SECRET is not set. Webhook signature checks will fail closed and every incoming \
                 notification will be rejected."
            );
            String::default()
        });
        let unpaid_order_timeout = env::var("MPS_UNPAID_ORDER_TIMEOUT")
            .map_err(|_| {
                info!(
                    "🪛️ MPS_UNPAID_ORDER_TIMEOUT is not set. Using the default value of {} hrs.",
                    DEFAULT_UNPAID_ORDER_TIMEOUT.num_hours()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::hours)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for MPS_UNPAID_ORDER_TIMEOUT. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_UNPAID_ORDER_TIMEOUT);
        let usd_fallback = parse_boolean_flag(env::var("MPS_USD_FALLBACK").ok(), true);
        let gateway = GatewayConfig::from_env_or_default();
        let stream = StreamConfig::from_env();
        Self {
            host,
            port,
            webhook_secret: Secret::new(webhook_secret),
            unpaid_order_timeout,
            usd_fallback,
            gateway,
            stream,
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("MPS_GATEWAY_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPS_GATEWAY_URL is not set. Please set it to the base url of the payment gateway API.");
            String::default()
        });
        let api_key = env::var("MPS_GATEWAY_API_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ MPS_GATEWAY_API_KEY is not set. Please set it to your merchant API key.");
            String::default()
        });
        let site_key = env::var("MPS_GATEWAY_SITE_KEY").ok().unwrap_or_else(|| {
            // The gateway refuses invoice creation without a site key, so say so loudly up front.
            error!("🪛️ MPS_GATEWAY_SITE_KEY is not set. Invoice creation will be rejected by the gateway.");
            String::default()
        });
        let callback_url = env::var("MPS_CALLBACK_URL").ok();
        Self { base_url, api_key: Secret::new(api_key), site_key: Secret::new(site_key), callback_url }
    }
}

impl StreamConfig {
    /// Returns `None` when `MPS_WS_URL` is unset. The server still runs, processing webhooks only.
    pub fn from_env() -> Option<Self> {
        let url = match env::var("MPS_WS_URL") {
            Ok(url) => url,
            Err(_) => {
                warn!(
                    "🪛️ MPS_WS_URL is not set. The notification stream is disabled and the server will rely on \
                     webhooks alone."
                );
                return None;
            },
        };
        let token = env::var("MPS_WS_TOKEN").ok().unwrap_or_else(|| {
            error!("🪛️ MPS_WS_TOKEN is not set. The stream connection will be rejected by the gateway.");
            String::default()
        });
        let ping_interval = duration_from_env("MPS_WS_PING_INTERVAL", DEFAULT_PING_INTERVAL);
        let reconnect_delay = duration_from_env("MPS_WS_RECONNECT_DELAY", DEFAULT_RECONNECT_DELAY);
        Some(Self { url, token: Secret::new(token), ping_interval, reconnect_delay })
    }
}

fn duration_from_env(var: &str, default: StdDuration) -> StdDuration {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {}s.", default.as_secs()))
        .and_then(|s| {
            s.parse::<u64>()
                .map(StdDuration::from_secs)
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
        })
        .ok()
        .unwrap_or(default)
}
