//! Application State

use std::sync::Arc;

use mpesa_payments::PaymentOrchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Initiation, reconciliation and payment queries.
    /// Initiation is refused when M-Pesa is not configured.
    pub payments: Arc<PaymentOrchestrator>,
}

impl AppState {
    pub fn new(payments: PaymentOrchestrator) -> Self {
        Self {
            payments: Arc::new(payments),
        }
    }
}
