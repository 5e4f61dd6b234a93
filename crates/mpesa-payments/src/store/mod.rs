//! Payment Record Storage
//!
//! Every method is one atomic persistence action. Listings are ordered
//! newest first and bounded by the caller-supplied limit.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePaymentStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{PaymentError, Result};
use crate::model::{
    FinalizeOutcome, FinalizeRequest, PaymentId, PaymentRecord, PaymentStatus, PaymentSummary,
};
use crate::phone::PhoneNumber;

/// Payment storage trait
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new pending payment
    async fn create(&self, amount: Decimal, phone_number: &PhoneNumber) -> Result<PaymentRecord>;

    /// Record the gateway's checkout request id.
    ///
    /// Returns `false` when no record has this id; that is not an error.
    async fn attach_checkout_request_id(
        &self,
        id: &PaymentId,
        checkout_request_id: &str,
    ) -> Result<bool>;

    /// Move the pending record matching `request.checkout_request_id` to its final state
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome>;

    async fn get_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>>;

    async fn get_by_phone(&self, phone_number: &PhoneNumber, limit: usize)
    -> Result<Vec<PaymentRecord>>;

    /// All payments, optionally restricted to one status
    async fn get_all(&self, limit: usize, status: Option<PaymentStatus>)
    -> Result<Vec<PaymentRecord>>;

    async fn summary(&self) -> Result<PaymentSummary>;
}

/// In-memory payment store (for development and tests)
pub struct MemoryPaymentStore {
    payments: RwLock<HashMap<PaymentId, PaymentRecord>>,
    by_checkout_request: RwLock<HashMap<String, PaymentId>>,
}

impl Default for MemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(HashMap::new()),
            by_checkout_request: RwLock::new(HashMap::new()),
        }
    }

    fn newest_first<'a>(
        records: impl Iterator<Item = &'a PaymentRecord>,
        limit: usize,
    ) -> Vec<PaymentRecord> {
        let mut matched: Vec<PaymentRecord> = records.cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        matched
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("payment store lock poisoned".into())
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn create(&self, amount: Decimal, phone_number: &PhoneNumber) -> Result<PaymentRecord> {
        let record = PaymentRecord::new(amount, phone_number.clone());
        let mut payments = self.payments.write().map_err(poisoned)?;
        payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn attach_checkout_request_id(
        &self,
        id: &PaymentId,
        checkout_request_id: &str,
    ) -> Result<bool> {
        let mut payments = self.payments.write().map_err(poisoned)?;
        let mut by_checkout = self.by_checkout_request.write().map_err(poisoned)?;

        let Some(record) = payments.get_mut(id) else {
            return Ok(false);
        };

        if by_checkout
            .get(checkout_request_id)
            .is_some_and(|owner| owner != id)
        {
            return Err(PaymentError::Storage(format!(
                "checkout request id {checkout_request_id} already belongs to another payment"
            )));
        }

        if let Some(previous) = record.checkout_request_id.replace(checkout_request_id.to_string()) {
            by_checkout.remove(&previous);
        }
        by_checkout.insert(checkout_request_id.to_string(), *id);
        Ok(true)
    }

    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome> {
        let mut payments = self.payments.write().map_err(poisoned)?;
        let by_checkout = self.by_checkout_request.read().map_err(poisoned)?;

        let record = by_checkout
            .get(&request.checkout_request_id)
            .and_then(|id| payments.get_mut(id));

        let Some(record) = record else {
            return Ok(FinalizeOutcome::Unmatched);
        };

        if record.status.is_terminal() {
            return Ok(FinalizeOutcome::AlreadyFinal(record.clone()));
        }

        record.apply(request);
        Ok(FinalizeOutcome::Applied(record.clone()))
    }

    async fn get_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>> {
        let payments = self.payments.read().map_err(poisoned)?;
        Ok(payments.get(id).cloned())
    }

    async fn get_by_phone(
        &self,
        phone_number: &PhoneNumber,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().map_err(poisoned)?;
        Ok(Self::newest_first(
            payments.values().filter(|p| &p.phone_number == phone_number),
            limit,
        ))
    }

    async fn get_all(
        &self,
        limit: usize,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().map_err(poisoned)?;
        Ok(Self::newest_first(
            payments
                .values()
                .filter(|p| status.is_none_or(|s| p.status == s)),
            limit,
        ))
    }

    async fn summary(&self) -> Result<PaymentSummary> {
        let payments = self.payments.read().map_err(poisoned)?;
        let mut summary = PaymentSummary::default();
        for payment in payments.values() {
            summary.record(payment.status, payment.amount);
        }
        Ok(summary)
    }
}
