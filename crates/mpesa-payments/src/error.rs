//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Bad amount or phone number, raised before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token or push-payment call to the gateway failed
    #[error("Gateway error: {0}")]
    Integration(String),

    /// Payment record not found
    #[error("Payment not found: {0}")]
    NotFound(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Inbound callback body did not match the expected envelope
    #[error("Callback parse error: {0}")]
    CallbackParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Stable machine-readable code for HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::Integration(_) => "GATEWAY_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Storage(_) => "STORAGE_ERROR",
            PaymentError::CallbackParse(_) => "CALLBACK_PARSE_ERROR",
            PaymentError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            // Validation messages are written for the payer already
            PaymentError::Validation(msg) => msg.clone(),
            PaymentError::Integration(_) => "Could not reach M-Pesa. Please try again.".into(),
            PaymentError::NotFound(_) => "Payment not found.".into(),
            PaymentError::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Integration(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_passed_through() {
        let err = PaymentError::Validation("Amount must be at least KES 1".into());
        assert_eq!(err.user_message(), "Amount must be at least KES 1");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = PaymentError::Storage("disk I/O error".into());
        assert!(!err.user_message().contains("disk"));
    }
}
