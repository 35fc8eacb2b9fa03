//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::DEFAULT_EPOCH_MS;
use domain::Money;
use order_saga::{OrchestratorConfig, PaymentGatewayConfig};
use thiserror::Error;
use url::Url;

/// Errors raised while turning configuration into component settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `INVENTORY_URL`, `CART_URL`: remote services; in-memory demo services when unset
/// - `PAYMENT_GATEWAY_URL`, `PAYMENT_APP_ID`, `PAYMENT_SECRET`,
///   `PAYMENT_NOTIFY_URL`, `PAYMENT_RETURN_URL`: payment gateway settings
/// - `WORKER_ID`: order id worker number, 0..=1023 (default: `0`)
/// - `ID_EPOCH_MS`: order id epoch in Unix milliseconds (default: 2024-01-01)
/// - `CALL_TIMEOUT_MS`: deadline for every remote call (default: `3000`)
/// - `SHIPPING_FEE`: flat shipping fee in minor units (default: `0`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub inventory_url: Option<String>,
    pub cart_url: Option<String>,
    pub payment_gateway_url: String,
    pub payment_app_id: String,
    pub payment_secret: String,
    pub payment_notify_url: String,
    pub payment_return_url: String,
    pub worker_id: u16,
    pub id_epoch_ms: u64,
    pub call_timeout_ms: u64,
    pub shipping_fee: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |name: &str, default: String| lookup(name).unwrap_or(default);
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            host: string("HOST", defaults.host),
            port: parsed(&lookup, "PORT", defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            database_url: optional("DATABASE_URL"),
            inventory_url: optional("INVENTORY_URL"),
            cart_url: optional("CART_URL"),
            payment_gateway_url: string("PAYMENT_GATEWAY_URL", defaults.payment_gateway_url),
            payment_app_id: string("PAYMENT_APP_ID", defaults.payment_app_id),
            payment_secret: string("PAYMENT_SECRET", defaults.payment_secret),
            payment_notify_url: string("PAYMENT_NOTIFY_URL", defaults.payment_notify_url),
            payment_return_url: string("PAYMENT_RETURN_URL", defaults.payment_return_url),
            worker_id: parsed(&lookup, "WORKER_ID", defaults.worker_id),
            id_epoch_ms: parsed(&lookup, "ID_EPOCH_MS", defaults.id_epoch_ms),
            call_timeout_ms: parsed(&lookup, "CALL_TIMEOUT_MS", defaults.call_timeout_ms),
            shipping_fee: parsed(&lookup, "SHIPPING_FEE", defaults.shipping_fee),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the deadline applied to remote calls.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Builds the orchestrator settings.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            call_timeout: self.call_timeout(),
            shipping_fee: Money::from_minor(self.shipping_fee),
        }
    }

    /// Builds the payment gateway settings.
    pub fn payment_gateway_config(&self) -> Result<PaymentGatewayConfig, ConfigError> {
        let gateway_url =
            Url::parse(&self.payment_gateway_url).map_err(|source| ConfigError::InvalidUrl {
                var: "PAYMENT_GATEWAY_URL",
                source,
            })?;
        Ok(PaymentGatewayConfig {
            gateway_url,
            app_id: self.payment_app_id.clone(),
            secret: self.payment_secret.clone(),
            notify_url: self.payment_notify_url.clone(),
            return_url: self.payment_return_url.clone(),
        })
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            inventory_url: None,
            cart_url: None,
            payment_gateway_url: "https://pay.example.com/gateway".to_string(),
            payment_app_id: "dev-app".to_string(),
            payment_secret: "dev-secret".to_string(),
            payment_notify_url: "http://localhost:3000/payments/notify".to_string(),
            payment_return_url: "http://localhost:3000/".to_string(),
            worker_id: 0,
            id_epoch_ms: DEFAULT_EPOCH_MS,
            call_timeout_ms: 3_000,
            shipping_fee: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.call_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_values_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("INVENTORY_URL", ""),
            ("WORKER_ID", "17"),
            ("CALL_TIMEOUT_MS", "250"),
            ("SHIPPING_FEE", "800"),
        ]));

        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert!(config.inventory_url.is_none());
        assert_eq!(config.worker_id, 17);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.call_timeout, Duration::from_millis(250));
        assert_eq!(orchestrator.shipping_fee, Money::from_minor(800));
    }

    #[test]
    fn test_unparsable_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("PORT", "eighty"), ("WORKER_ID", "-1")]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.worker_id, 0);
    }

    #[test]
    fn test_invalid_gateway_url() {
        let config = Config {
            payment_gateway_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.payment_gateway_config(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
