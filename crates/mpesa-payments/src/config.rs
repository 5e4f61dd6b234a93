//! Gateway Configuration
//!
//! Credentials are read once at startup and handed to the gateway client;
//! nothing else in the crate touches the environment.

use crate::error::{PaymentError, Result};

/// Daraja sandbox host
pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Path the gateway posts callbacks to, relative to `callback_base_url`
pub const CALLBACK_PATH: &str = "/api/mpesa-callback";

/// M-Pesa Daraja configuration
#[derive(Clone)]
pub struct GatewayConfig {
    pub consumer_key: String,
    pub consumer_secret: String,

    /// Paybill / till number receiving the payment
    pub shortcode: String,

    /// Lipa Na M-Pesa Online passkey
    pub passkey: String,

    /// Public base URL of this service, e.g. `https://pay.example.com`
    pub callback_base_url: String,

    /// Daraja API host
    pub base_url: String,

    pub account_reference: String,
    pub transaction_desc: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("shortcode", &self.shortcode)
            .field("callback_base_url", &self.callback_base_url)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// Create with the required settings and sandbox defaults for the rest
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            shortcode: shortcode.into(),
            passkey: passkey.into(),
            callback_base_url: callback_base_url.into(),
            base_url: SANDBOX_BASE_URL.into(),
            account_reference: "Payment".into(),
            transaction_desc: "Payment".into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, config file, test map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PaymentError::Config(format!("{key} not set")))
        };

        let mut config = Self::new(
            required("MPESA_CONSUMER_KEY")?,
            required("MPESA_CONSUMER_SECRET")?,
            required("MPESA_SHORTCODE")?,
            required("MPESA_PASSKEY")?,
            required("MPESA_CALLBACK_BASE_URL")?,
        );

        if let Some(base_url) = lookup("MPESA_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(reference) = lookup("MPESA_ACCOUNT_REFERENCE") {
            config.account_reference = reference;
        }
        if let Some(desc) = lookup("MPESA_TRANSACTION_DESC") {
            config.transaction_desc = desc;
        }

        Ok(config)
    }

    /// Full callback URL sent with every push request
    pub fn callback_url(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.callback_base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn complete() -> HashMap<String, String> {
        env(&[
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
            ("MPESA_SHORTCODE", "174379"),
            ("MPESA_PASSKEY", "passkey"),
            ("MPESA_CALLBACK_BASE_URL", "https://pay.example.com/"),
        ])
    }

    #[test]
    fn test_defaults() {
        let vars = complete();
        let config = GatewayConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.base_url, SANDBOX_BASE_URL);
        assert_eq!(config.account_reference, "Payment");
        assert_eq!(config.callback_url(), "https://pay.example.com/api/mpesa-callback");
    }

    #[test]
    fn test_missing_passkey() {
        let mut vars = complete();
        vars.remove("MPESA_PASSKEY");

        let err = GatewayConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("MPESA_PASSKEY"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = GatewayConfig::new("key", "topsecret", "174379", "pk", "https://x");
        assert!(!format!("{config:?}").contains("topsecret"));
    }
}
