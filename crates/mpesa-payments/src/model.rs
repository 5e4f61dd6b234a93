//! Payment Records
//!
//! A payment moves `pending -> completed` or `pending -> failed` exactly once.
//! Amounts use `rust_decimal` throughout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::phone::PhoneNumber;

/// Payment record identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed payments never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment record
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: PaymentId,

    /// Amount in KES
    pub amount: Decimal,

    pub phone_number: PhoneNumber,

    pub status: PaymentStatus,

    /// `CheckoutRequestID` assigned by M-Pesa when the push is accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,

    /// M-Pesa receipt number, only on completed payments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PaymentRecord {
    /// Create a new pending payment
    pub fn new(amount: Decimal, phone_number: PhoneNumber) -> Self {
        Self {
            id: PaymentId::generate(),
            amount,
            phone_number,
            status: PaymentStatus::Pending,
            checkout_request_id: None,
            transaction_id: None,
            created_at: Utc::now(),
            updated_at: None,
            failure_reason: None,
        }
    }

    /// Apply a callback outcome to this record
    pub fn apply(&mut self, request: &FinalizeRequest) {
        self.status = request.status;
        self.updated_at = Some(Utc::now());

        if let Some(ref receipt) = request.transaction_id {
            self.transaction_id = Some(receipt.clone());
        }
        if let Some(ref reason) = request.failure_reason {
            self.failure_reason = Some(reason.clone());
        }
        if let Some(ref phone) = request.confirmed_phone {
            self.phone_number = phone.clone();
        }
        if let Some(amount) = request.confirmed_amount {
            self.amount = amount;
        }
    }
}

/// Final outcome reported by the gateway for one checkout request
#[derive(Clone, Debug, PartialEq)]
pub struct FinalizeRequest {
    pub checkout_request_id: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub confirmed_phone: Option<PhoneNumber>,
    pub confirmed_amount: Option<Decimal>,
}

impl FinalizeRequest {
    pub fn completed(checkout_request_id: impl Into<String>, receipt: Option<String>) -> Self {
        Self {
            checkout_request_id: checkout_request_id.into(),
            status: PaymentStatus::Completed,
            transaction_id: receipt,
            failure_reason: None,
            confirmed_phone: None,
            confirmed_amount: None,
        }
    }

    pub fn failed(checkout_request_id: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            checkout_request_id: checkout_request_id.into(),
            status: PaymentStatus::Failed,
            transaction_id: None,
            failure_reason: reason,
            confirmed_phone: None,
            confirmed_amount: None,
        }
    }
}

/// Result of a finalize attempt
#[derive(Clone, Debug)]
pub enum FinalizeOutcome {
    /// The pending record was moved to its terminal state
    Applied(PaymentRecord),

    /// The record was already completed or failed; nothing changed
    AlreadyFinal(PaymentRecord),

    /// No record carries this checkout request id
    Unmatched,
}

/// Aggregate counts over all stored payments
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,

    /// Sum of completed payment amounts
    pub completed_amount: Decimal,
}

impl PaymentSummary {
    pub fn record(&mut self, status: PaymentStatus, amount: Decimal) {
        self.total += 1;
        match status {
            PaymentStatus::Pending => self.pending += 1,
            PaymentStatus::Completed => {
                self.completed += 1;
                self.completed_amount += amount;
            }
            PaymentStatus::Failed => self.failed += 1,
        }
    }
}
