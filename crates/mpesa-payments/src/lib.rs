//! # mpesa-payments
//!
//! M-Pesa STK push payments: initiate a push, reconcile the asynchronous
//! callback, and keep an auditable record of every attempt.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  initiate   ┌──────────────┐  token + STK push  ┌──────────┐
//! │  Client  │────────────▶│ Orchestrator │───────────────────▶│  Daraja  │
//! └──────────┘             └──────┬───────┘                    └────┬─────┘
//!                                 │ pending record                  │ prompt on
//!                                 ▼ + CheckoutRequestID             ▼ payer's phone
//!                          ┌──────────────┐     callback      ┌──────────┐
//!                          │ PaymentStore │◀──────────────────│  Payer   │
//!                          └──────────────┘  completed/failed └──────────┘
//! ```
//!
//! A payment is `pending` until the callback arrives, then `completed` or
//! `failed` for good. Callbacks that match no payment, or that repeat an
//! outcome already recorded, are acknowledged and ignored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mpesa_payments::{DarajaClient, GatewayConfig, MemoryPaymentStore, PaymentOrchestrator};
//! use rust_decimal_macros::dec;
//!
//! let config = GatewayConfig::from_env()?;
//! let callback_url = config.callback_url();
//! let orchestrator = PaymentOrchestrator::new(
//!     Arc::new(MemoryPaymentStore::new()),
//!     Arc::new(DarajaClient::new(config)),
//!     callback_url,
//! );
//!
//! let outcome = orchestrator.initiate(dec!(100), "0712345678").await?;
//! // outcome.checkout_request_id identifies the callback that will follow
//! ```

pub mod callback;
pub mod config;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod phone;
pub mod store;
mod error;

pub use callback::{CallbackAck, StkCallback};
pub use config::GatewayConfig;
pub use error::{PaymentError, Result};
pub use gateway::{DarajaClient, MockGateway, PushGateway};
pub use model::{PaymentId, PaymentRecord, PaymentStatus, PaymentSummary};
pub use orchestrator::{InitiateOutcome, PaymentOrchestrator};
pub use phone::PhoneNumber;
pub use store::{MemoryPaymentStore, PaymentStore};

#[cfg(feature = "sqlite")]
pub use store::SqlitePaymentStore;
