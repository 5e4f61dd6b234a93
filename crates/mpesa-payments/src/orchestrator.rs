//! Payment Orchestration
//!
//! ```text
//! initiate:  validate ─▶ create(pending) ─▶ token ─▶ STK push ─▶ attach CheckoutRequestID
//! callback:  parse ─▶ find by CheckoutRequestID ─▶ completed | failed
//! ```
//!
//! A record created before a failing gateway call stays pending with no
//! checkout request id; it is kept for audit rather than rolled back.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::callback::{self, CallbackAck, StkCallback};
use crate::error::{PaymentError, Result};
use crate::gateway::{PushGateway, PushRequest};
use crate::model::{FinalizeOutcome, PaymentId, PaymentRecord, PaymentStatus, PaymentSummary};
use crate::phone::PhoneNumber;
use crate::store::PaymentStore;

/// Smallest accepted amount (KES)
pub const MIN_AMOUNT: Decimal = dec!(1);

/// Largest single STK push M-Pesa accepts (KES)
pub const MAX_AMOUNT: Decimal = dec!(150000);

/// Cap on payment history per phone number
pub const HISTORY_LIMIT: usize = 10;

/// Cap on the all-payments listing
pub const LISTING_LIMIT: usize = 50;

/// Result of a payment initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitiateOutcome {
    fn started(payment_id: PaymentId, checkout_request_id: Option<String>) -> Self {
        Self {
            success: true,
            checkout_request_id,
            payment_id: Some(payment_id),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            checkout_request_id: None,
            payment_id: None,
            error: Some(error.into()),
        }
    }
}

/// Check an amount before anything is written
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount < MIN_AMOUNT {
        return Err(PaymentError::Validation("Amount must be at least KES 1".into()));
    }
    if amount > MAX_AMOUNT {
        return Err(PaymentError::Validation("Amount cannot exceed KES 150,000".into()));
    }
    if !amount.fract().is_zero() {
        return Err(PaymentError::Validation("Amount must be a whole number of KES".into()));
    }
    Ok(())
}

/// Sequences payment initiation and callback reconciliation
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn PaymentStore>,

    /// Gateway and callback URL; `None` disables initiation
    gateway: Option<(Arc<dyn PushGateway>, String)>,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PushGateway>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway: Some((gateway, callback_url.into())),
        }
    }

    /// Records, history and callbacks only; [`initiate`](Self::initiate) is refused
    pub fn without_gateway(store: Arc<dyn PaymentStore>) -> Self {
        Self { store, gateway: None }
    }

    pub fn gateway_name(&self) -> Option<&str> {
        self.gateway.as_ref().map(|(gateway, _)| gateway.name())
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    /// Start an STK push for `amount` KES to `phone_number`.
    ///
    /// Invalid input is returned as `Err(PaymentError::Validation)` with no
    /// side effects, as is `Err(PaymentError::Config)` when no gateway is
    /// configured. Anything that goes wrong afterwards is reported in the
    /// returned outcome with `success: false`.
    pub async fn initiate(&self, amount: Decimal, phone_number: &str) -> Result<InitiateOutcome> {
        let (gateway, callback_url) = self
            .gateway
            .as_ref()
            .ok_or_else(|| PaymentError::Config("M-Pesa gateway not configured".into()))?;

        validate_amount(amount)?;
        let phone = PhoneNumber::parse(phone_number)?;

        tracing::debug!(input = %phone_number, phone = %phone, "Formatted phone number");

        match self.start_push(&**gateway, callback_url, amount, &phone).await {
            Ok((payment_id, checkout_request_id)) => {
                tracing::info!(
                    payment_id = %payment_id,
                    checkout_request_id = ?checkout_request_id,
                    amount = %amount,
                    "STK push initiated"
                );
                Ok(InitiateOutcome::started(payment_id, checkout_request_id))
            }
            Err(e) => {
                tracing::error!(error = %e, amount = %amount, phone = %phone, "STK push failed");
                Ok(InitiateOutcome::failed(e.to_string()))
            }
        }
    }

    async fn start_push(
        &self,
        gateway: &dyn PushGateway,
        callback_url: &str,
        amount: Decimal,
        phone: &PhoneNumber,
    ) -> Result<(PaymentId, Option<String>)> {
        let payment = self.store.create(amount, phone).await?;

        let token = gateway.access_token().await?;
        let request = PushRequest {
            amount,
            phone_number: phone.clone(),
            callback_url: callback_url.to_string(),
        };
        let response = gateway.submit_push(&token, &request).await?;

        if let Some(ref checkout_request_id) = response.checkout_request_id {
            let attached = self
                .store
                .attach_checkout_request_id(&payment.id, checkout_request_id)
                .await?;
            if !attached {
                tracing::warn!(payment_id = %payment.id, "Payment vanished before checkout id was attached");
            }
        }

        Ok((payment.id, response.checkout_request_id))
    }

    /// Apply an already-parsed gateway callback
    pub async fn handle_callback(&self, callback: &StkCallback) -> Result<FinalizeOutcome> {
        callback::handle_callback(self.store.as_ref(), callback).await
    }

    /// Apply a raw callback body and produce the gateway acknowledgement
    pub async fn receive_callback(&self, body: &[u8]) -> CallbackAck {
        callback::receive_callback(self.store.as_ref(), body).await
    }

    pub async fn payment(&self, id: &PaymentId) -> Result<PaymentRecord> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))
    }

    /// Newest payments for one phone, at most [`HISTORY_LIMIT`]
    pub async fn history_for_phone(
        &self,
        phone: &PhoneNumber,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentRecord>> {
        let limit = limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
        self.store.get_by_phone(phone, limit).await
    }

    /// Newest payments overall, at most [`LISTING_LIMIT`]
    pub async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<PaymentRecord>> {
        let limit = limit.unwrap_or(LISTING_LIMIT).min(LISTING_LIMIT);
        self.store.get_all(limit, status).await
    }

    pub async fn summary(&self) -> Result<PaymentSummary> {
        self.store.summary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockBehavior, MockGateway};
    use crate::store::MemoryPaymentStore;
    use serde_json::json;

    const CALLBACK_URL: &str = "https://pay.example.com/api/mpesa-callback";

    fn orchestrator(behavior: MockBehavior) -> (PaymentOrchestrator, Arc<MemoryPaymentStore>, Arc<MockGateway>) {
        let store = Arc::new(MemoryPaymentStore::new());
        let gateway = Arc::new(MockGateway::with_behavior(behavior));
        let orchestrator = PaymentOrchestrator::new(store.clone(), gateway.clone(), CALLBACK_URL);
        (orchestrator, store, gateway)
    }

    fn callback_body(checkout: &str, result_code: i64) -> Vec<u8> {
        let desc = if result_code == 0 {
            "The service request is processed successfully."
        } else {
            "Request cancelled by user"
        };
        let mut stk = json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout,
            "ResultCode": result_code,
            "ResultDesc": desc,
        });
        if result_code == 0 {
            stk["CallbackMetadata"] = json!({
                "Item": [
                    { "Name": "Amount", "Value": 100 },
                    { "Name": "MpesaReceiptNumber", "Value": "ABC123" },
                    { "Name": "TransactionDate", "Value": 20191219102115_u64 },
                    { "Name": "PhoneNumber", "Value": "254712345678.0" }
                ]
            });
        }
        serde_json::to_vec(&json!({ "Body": { "stkCallback": stk } })).unwrap()
    }

    #[tokio::test]
    async fn test_amount_bounds() {
        let (orchestrator, store, _) = orchestrator(MockBehavior::Accept);

        for amount in [dec!(0), dec!(150001), dec!(-5), dec!(10.5)] {
            let err = orchestrator.initiate(amount, "0712345678").await.unwrap_err();
            assert!(matches!(err, PaymentError::Validation(_)), "{amount}");
        }
        assert_eq!(store.get_all(50, None).await.unwrap().len(), 0);

        let outcome = orchestrator.initiate(dec!(150000), "0712345678").await.unwrap();
        assert!(outcome.success);
        let outcome = orchestrator.initiate(dec!(1), "0712345678").await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_bad_phone_creates_nothing() {
        let (orchestrator, store, gateway) = orchestrator(MockBehavior::Accept);

        let err = orchestrator.initiate(dec!(100), "123").await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert!(store.get_all(50, None).await.unwrap().is_empty());
        assert!(gateway.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_attaches_checkout_id() {
        let (orchestrator, store, gateway) = orchestrator(MockBehavior::Accept);

        let outcome = orchestrator.initiate(dec!(100), "0712 345 678").await.unwrap();
        assert!(outcome.success);
        let checkout = outcome.checkout_request_id.unwrap();

        let all = store.get_all(50, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PaymentStatus::Pending);
        assert_eq!(all[0].checkout_request_id.as_deref(), Some(checkout.as_str()));
        assert_eq!(Some(all[0].id), outcome.payment_id);

        let sent = gateway.submitted().await;
        assert_eq!(sent[0].phone_number.as_str(), "254712345678");
        assert_eq!(sent[0].callback_url, CALLBACK_URL);
    }

    #[tokio::test]
    async fn test_missing_checkout_id_still_succeeds() {
        let (orchestrator, store, _) = orchestrator(MockBehavior::AcceptWithoutId);

        let outcome = orchestrator.initiate(dec!(100), "0712345678").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.checkout_request_id.is_none());

        let all = store.get_all(50, None).await.unwrap();
        assert!(all[0].checkout_request_id.is_none());
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_orphan() {
        for behavior in [MockBehavior::TokenFailure, MockBehavior::PushFailure] {
            let (orchestrator, store, _) = orchestrator(behavior);

            let outcome = orchestrator.initiate(dec!(100), "0712345678").await.unwrap();
            assert!(!outcome.success);
            assert!(outcome.error.is_some());
            assert!(outcome.payment_id.is_none());

            let all = store.get_all(50, None).await.unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].status, PaymentStatus::Pending);
            assert!(all[0].checkout_request_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_failed_initiate_reports_gateway_message() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::PushFailure);

        let outcome = orchestrator.initiate(dec!(100), "0712345678").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Gateway error: mock connection reset"));
    }

    #[tokio::test]
    async fn test_successful_callback_completes_payment() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::Accept);
        let outcome = orchestrator.initiate(dec!(100), "712345678").await.unwrap();
        let checkout = outcome.checkout_request_id.unwrap();

        let ack = orchestrator.receive_callback(&callback_body(&checkout, 0)).await;
        assert_eq!(ack, CallbackAck::accepted());

        let payment = orchestrator.payment(&outcome.payment_id.unwrap()).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.transaction_id.as_deref(), Some("ABC123"));
        assert_eq!(payment.phone_number.as_str(), "254712345678");
        assert!(payment.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_callback_records_reason() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::Accept);
        let outcome = orchestrator.initiate(dec!(100), "0712345678").await.unwrap();
        let checkout = outcome.checkout_request_id.unwrap();

        let ack = orchestrator.receive_callback(&callback_body(&checkout, 1032)).await;
        assert_eq!(ack, CallbackAck::accepted());

        let payment = orchestrator.payment(&outcome.payment_id.unwrap()).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("Request cancelled by user"));
        assert!(payment.transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_replayed_callback_does_not_change_final_state() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::Accept);
        let outcome = orchestrator.initiate(dec!(100), "0712345678").await.unwrap();
        let checkout = outcome.checkout_request_id.unwrap();

        orchestrator.receive_callback(&callback_body(&checkout, 0)).await;
        let ack = orchestrator.receive_callback(&callback_body(&checkout, 1032)).await;
        assert_eq!(ack, CallbackAck::accepted());

        let payment = orchestrator.payment(&outcome.payment_id.unwrap()).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_initiate_without_gateway() {
        let store = Arc::new(MemoryPaymentStore::new());
        let orchestrator = PaymentOrchestrator::without_gateway(store.clone());

        let err = orchestrator.initiate(dec!(100), "0712345678").await.unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
        assert!(store.get_all(50, None).await.unwrap().is_empty());
        assert!(orchestrator.gateway_name().is_none());
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::Accept);
        let err = orchestrator.payment(&PaymentId::generate()).await.unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listing_caps() {
        let (orchestrator, _, _) = orchestrator(MockBehavior::Accept);
        for _ in 0..55 {
            orchestrator.initiate(dec!(10), "0712345678").await.unwrap();
        }
        let phone = PhoneNumber::parse("0712345678").unwrap();

        assert_eq!(orchestrator.history_for_phone(&phone, None).await.unwrap().len(), 10);
        assert_eq!(orchestrator.history_for_phone(&phone, Some(500)).await.unwrap().len(), 10);
        assert_eq!(orchestrator.history_for_phone(&phone, Some(3)).await.unwrap().len(), 3);
        assert_eq!(orchestrator.list_payments(None, None).await.unwrap().len(), 50);
        assert_eq!(
            orchestrator
                .list_payments(Some(PaymentStatus::Completed), None)
                .await
                .unwrap()
                .len(),
            0
        );
        assert_eq!(orchestrator.summary().await.unwrap().pending, 55);
    }
}
