//! Safaricom Daraja Client

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::{PushGateway, PushRequest, PushResponse, password, timestamp};
use crate::config::GatewayConfig;
use crate::error::{PaymentError, Result};

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Daraja API client
pub struct DarajaClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'a str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

impl DarajaClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PushGateway for DarajaClient {
    async fn access_token(&self) -> Result<String> {
        let response = self
            .http
            .get(self.url(TOKEN_PATH))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Integration(format!(
                "token request returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let token: TokenResponse = response.json().await?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PaymentError::Integration("token response missing access_token".into()))
    }

    async fn submit_push(&self, token: &str, request: &PushRequest) -> Result<PushResponse> {
        let amount = request.amount.to_u64().ok_or_else(|| {
            PaymentError::Validation(format!("Amount {} cannot be sent to M-Pesa", request.amount))
        })?;

        let timestamp = timestamp(Utc::now());
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount,
            party_a: request.phone_number.as_str(),
            party_b: &self.config.shortcode,
            phone_number: request.phone_number.as_str(),
            callback_url: &request.callback_url,
            account_reference: &self.config.account_reference,
            transaction_desc: &self.config.transaction_desc,
        };

        let response = self
            .http
            .post(self.url(STK_PUSH_PATH))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw: serde_json::Value = response.json().await?;
        let push = PushResponse::from_value(raw);

        if push.checkout_request_id.is_none() {
            tracing::warn!(
                http_status = %status,
                error = ?push.error_message,
                "STK push returned no CheckoutRequestID"
            );
        }

        Ok(push)
    }

    fn name(&self) -> &str {
        "daraja"
    }
}
