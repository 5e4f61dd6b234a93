//! STK Push Callback Handling
//!
//! The gateway reports every push outcome by POSTing this envelope to the
//! callback URL:
//!
//! ```json
//! {
//!   "Body": {
//!     "stkCallback": {
//!       "MerchantRequestID": "29115-34620561-1",
//!       "CheckoutRequestID": "ws_CO_191220191020363925",
//!       "ResultCode": 0,
//!       "ResultDesc": "The service request is processed successfully.",
//!       "CallbackMetadata": {
//!         "Item": [
//!           { "Name": "Amount", "Value": 1.00 },
//!           { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
//!           { "Name": "TransactionDate", "Value": 20191219102115 },
//!           { "Name": "PhoneNumber", "Value": 254708374149.0 }
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! The gateway redelivers anything that is not acknowledged with HTTP 200,
//! so every outcome here, including unknown ids and internal errors, is
//! answered with a [`CallbackAck`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{PaymentError, Result};
use crate::model::{FinalizeOutcome, FinalizeRequest};
use crate::phone::PhoneNumber;
use crate::store::PaymentStore;

/// Outer callback envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// Outcome of one STK push
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    /// 0 = success, anything else is a failure (1032 = cancelled by user, …)
    #[serde(rename = "ResultCode")]
    pub result_code: i64,

    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,

    /// Present on success only
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,

    /// Some items (`Balance`) carry no value at all
    #[serde(rename = "Value", default)]
    pub value: Option<MetadataValue>,
}

/// Metadata values arrive as JSON numbers or strings depending on the field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(serde_json::Number),
    Text(String),
}

impl MetadataValue {
    /// Textual form; numbers keep their JSON spelling (`254708374149.0`)
    pub fn as_text(&self) -> String {
        match self {
            MetadataValue::Number(n) => n.to_string(),
            MetadataValue::Text(s) => s.clone(),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(self.as_text().trim()).ok()
    }
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Look up a metadata item by name
    pub fn metadata(&self, name: &str) -> Option<&MetadataValue> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// Translate into a store update, normalizing the confirmed phone
    pub fn to_finalize_request(&self) -> FinalizeRequest {
        if !self.is_success() {
            let reason = Some(self.result_desc.clone()).filter(|d| !d.is_empty());
            return FinalizeRequest::failed(&self.checkout_request_id, reason);
        }

        let receipt = self.metadata("MpesaReceiptNumber").map(MetadataValue::as_text);
        let mut request = FinalizeRequest::completed(&self.checkout_request_id, receipt);

        request.confirmed_amount = self.metadata("Amount").and_then(MetadataValue::as_decimal);
        request.confirmed_phone = self.metadata("PhoneNumber").and_then(|value| {
            let raw = value.as_text();
            PhoneNumber::from_gateway(&raw)
                .inspect_err(|e| {
                    tracing::warn!(
                        checkout_request_id = %self.checkout_request_id,
                        phone = %raw,
                        error = %e,
                        "Ignoring unparseable callback phone number"
                    );
                })
                .ok()
        });

        request
    }
}

/// Acknowledgement returned to the gateway (always with HTTP 200)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    /// Callback received and processed (or safely ignored)
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Success".into(),
        }
    }

    /// Callback received but could not be processed
    pub fn internal_error() -> Self {
        Self {
            result_code: 1,
            result_desc: "Internal server error".into(),
        }
    }
}

/// Parse a raw callback body
pub fn parse_callback(body: &[u8]) -> Result<StkCallback> {
    serde_json::from_slice::<CallbackEnvelope>(body)
        .map(|envelope| envelope.body.stk_callback)
        .map_err(|e| PaymentError::CallbackParse(e.to_string()))
}

/// Apply a parsed callback to the matching payment
pub async fn handle_callback(store: &dyn PaymentStore, callback: &StkCallback) -> Result<FinalizeOutcome> {
    tracing::info!(
        checkout_request_id = %callback.checkout_request_id,
        result_code = callback.result_code,
        result_desc = %callback.result_desc,
        "Processing M-Pesa callback"
    );

    let request = callback.to_finalize_request();
    let outcome = store.finalize(&request).await?;

    match &outcome {
        FinalizeOutcome::Applied(payment) => {
            tracing::info!(
                payment_id = %payment.id,
                checkout_request_id = %callback.checkout_request_id,
                status = %payment.status,
                transaction_id = ?payment.transaction_id,
                "Payment finalized"
            );
        }
        FinalizeOutcome::AlreadyFinal(payment) => {
            tracing::info!(
                payment_id = %payment.id,
                checkout_request_id = %callback.checkout_request_id,
                status = %payment.status,
                "Duplicate callback for finalized payment ignored"
            );
        }
        FinalizeOutcome::Unmatched => {
            tracing::warn!(
                checkout_request_id = %callback.checkout_request_id,
                "No payment matches callback"
            );
        }
    }

    Ok(outcome)
}

/// Boundary entry point: raw body in, acknowledgement out. Never fails.
pub async fn receive_callback(store: &dyn PaymentStore, body: &[u8]) -> CallbackAck {
    let callback = match parse_callback(body) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::error!(error = %e, "Rejected malformed M-Pesa callback");
            return CallbackAck::internal_error();
        }
    };

    match handle_callback(store, &callback).await {
        Ok(_) => CallbackAck::accepted(),
        Err(e) => {
            tracing::error!(
                checkout_request_id = %callback.checkout_request_id,
                error = %e,
                "Callback processing failed"
            );
            CallbackAck::internal_error()
        }
    }
}
