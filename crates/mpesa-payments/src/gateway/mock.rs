//! Mock Gateway
//!
//! For tests and local demos. Accepts every push and hands back a fresh
//! `ws_CO_…` checkout request id unless told otherwise.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PushGateway, PushRequest, PushResponse};
use crate::error::{PaymentError, Result};

/// How the mock answers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MockBehavior {
    /// Accept and return a checkout request id
    #[default]
    Accept,

    /// Accept but omit the checkout request id
    AcceptWithoutId,

    /// Fail the token exchange
    TokenFailure,

    /// Fail the push call at the transport level
    PushFailure,
}

/// Scripted push gateway
pub struct MockGateway {
    behavior: MockBehavior,
    submitted: Mutex<Vec<PushRequest>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Accept)
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Every push request received so far
    pub async fn submitted(&self) -> Vec<PushRequest> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl PushGateway for MockGateway {
    async fn access_token(&self) -> Result<String> {
        match self.behavior {
            MockBehavior::TokenFailure => {
                Err(PaymentError::Integration("mock token endpoint unavailable".into()))
            }
            _ => Ok("mock-token".into()),
        }
    }

    async fn submit_push(&self, _token: &str, request: &PushRequest) -> Result<PushResponse> {
        self.submitted.lock().await.push(request.clone());

        let checkout_request_id = match self.behavior {
            MockBehavior::PushFailure => {
                return Err(PaymentError::Integration("mock connection reset".into()));
            }
            MockBehavior::AcceptWithoutId => None,
            _ => Some(format!("ws_CO_{}", uuid::Uuid::new_v4().simple())),
        };

        let raw = serde_json::json!({
            "MerchantRequestID": "mock-merchant",
            "CheckoutRequestID": checkout_request_id,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing",
        });

        Ok(PushResponse::from_value(raw))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
