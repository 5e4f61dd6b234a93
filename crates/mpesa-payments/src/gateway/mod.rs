//! M-Pesa Gateway Integration
//!
//! A push payment is two calls: exchange the consumer key/secret for a
//! bearer token, then submit the STK push with that token. The gateway
//! later reports the outcome to the callback URL.

mod daraja;
mod mock;

pub use daraja::DarajaClient;
pub use mock::{MockBehavior, MockGateway};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::Result;
use crate::phone::PhoneNumber;

/// Push-payment gateway (Daraja in production, mock in tests)
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Obtain a bearer token for the push endpoint
    async fn access_token(&self) -> Result<String>;

    /// Send an STK push prompt to the payer's phone
    async fn submit_push(&self, token: &str, request: &PushRequest) -> Result<PushResponse>;

    /// Gateway name
    fn name(&self) -> &str;
}

/// STK push parameters
#[derive(Clone, Debug, PartialEq)]
pub struct PushRequest {
    /// Whole KES
    pub amount: Decimal,
    pub phone_number: PhoneNumber,
    pub callback_url: String,
}

/// Synchronous answer to an STK push.
///
/// Fields are read by key so one oddly typed field (Daraja has sent
/// `ResponseCode` both as `"0"` and `0`) never hides the others.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PushResponse {
    pub merchant_request_id: Option<String>,

    /// Correlates the later callback with this request
    pub checkout_request_id: Option<String>,

    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub customer_message: Option<String>,

    /// Daraja's error body (`errorMessage`) when the push was refused
    pub error_message: Option<String>,

    /// Untouched response body
    pub raw: Value,
}

impl PushResponse {
    /// Parse a Daraja response body, keeping the raw JSON alongside
    pub fn from_value(raw: Value) -> Self {
        Self {
            merchant_request_id: text_field(&raw, "MerchantRequestID"),
            checkout_request_id: text_field(&raw, "CheckoutRequestID"),
            response_code: text_field(&raw, "ResponseCode"),
            response_description: text_field(&raw, "ResponseDescription"),
            customer_message: text_field(&raw, "CustomerMessage"),
            error_message: text_field(&raw, "errorMessage"),
            raw,
        }
    }
}

/// String or number at `key`, as text
fn text_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Request timestamp in the gateway's `YYYYMMDDHHMMSS` format.
///
/// Daraja expects Nairobi local time, which is UTC+3 all year.
pub fn timestamp(now: DateTime<Utc>) -> String {
    (now + TimeDelta::hours(3)).format("%Y%m%d%H%M%S").to_string()
}

/// Request password: `base64(shortcode + passkey + timestamp)`
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_nairobi_time() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 22, 5, 9).unwrap();
        assert_eq!(timestamp(now), "20250101010509");
    }

    #[test]
    fn test_password_encoding() {
        let pw = password("174379", "passkey", "20240101120000");
        let decoded = STANDARD.decode(pw).unwrap();
        assert_eq!(decoded, b"174379passkey20240101120000");
    }

    #[test]
    fn test_push_response_parsing() {
        let raw = serde_json::json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        });

        let response = PushResponse::from_value(raw.clone());
        assert_eq!(
            response.checkout_request_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
        assert_eq!(response.raw, raw);
    }

    #[test]
    fn test_push_error_body_has_no_checkout_id() {
        let raw = serde_json::json!({
            "requestId": "1234-5678",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        });

        let response = PushResponse::from_value(raw);
        assert!(response.checkout_request_id.is_none());
        assert_eq!(
            response.error_message.as_deref(),
            Some("Bad Request - Invalid PhoneNumber")
        );
    }

    #[test]
    fn test_numeric_response_code_keeps_checkout_id() {
        let raw = serde_json::json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": 0,
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": null
        });

        let response = PushResponse::from_value(raw);
        assert_eq!(
            response.checkout_request_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
        assert_eq!(response.merchant_request_id.as_deref(), Some("29115-34620561-1"));
        assert_eq!(response.response_code.as_deref(), Some("0"));
        assert!(response.customer_message.is_none());
    }
}
