//! Runtime configuration shared by the engine and its adapters.
//!
//! The binary fills these in from command-line flags and environment
//! variables; library users construct them directly.

use std::path::PathBuf;

pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.sandbox.local/pay";
pub const DEFAULT_RETURN_URL: &str = "http://localhost:8000/installments/gateway/return";
pub const DEFAULT_NOTIFY_URL: &str = "http://localhost:8000/installments/gateway/notify";
pub const DEFAULT_METHOD_TAG: &str = "alipay";
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Gateway endpoint, credentials and callback targets.
#[derive(Clone)]
pub struct GatewaySettings {
    pub url: String,
    pub secret: String,
    /// Recorded as the payment method of every settled step.
    pub method_tag: String,
    /// Where the browser lands after checkout.
    pub return_url: String,
    /// Where the gateway posts asynchronous notifications.
    pub notify_url: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            secret: String::new(),
            method_tag: DEFAULT_METHOD_TAG.to_string(),
            return_url: DEFAULT_RETURN_URL.to_string(),
            notify_url: DEFAULT_NOTIFY_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("method_tag", &self.method_tag)
            .field("return_url", &self.return_url)
            .field("notify_url", &self.notify_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Persistent database location; `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub page_size: usize,
    pub gateway: GatewaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            gateway: GatewaySettings::default(),
        }
    }
}
