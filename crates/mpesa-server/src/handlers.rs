//! HTTP Handlers

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mpesa_payments::{
    CallbackAck, InitiateOutcome, PaymentError, PaymentId, PaymentRecord, PaymentStatus,
    PaymentSummary, PhoneNumber,
};

use crate::state::AppState;

/// Largest callback body read; Daraja sends well under 1 KiB
const CALLBACK_BODY_LIMIT: usize = 64 * 1024;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gateway_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub amount: Decimal,
    pub phone_number: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: &PaymentError) -> ApiError {
    let status = match err {
        PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        PaymentError::Integration(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gateway_configured: state.payments.gateway_name().is_some(),
    })
}

/// Start an STK push
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiateRequest>,
) -> Result<Json<InitiateOutcome>, ApiError> {
    state
        .payments
        .initiate(payload.amount, &payload.phone_number)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Single payment, for status polling
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError> {
    let id = PaymentId::parse(&id).ok_or_else(|| api_error(&PaymentError::NotFound(id.clone())))?;

    state
        .payments
        .payment(&id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Newest payments, optionally by status
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("" | "all") => None,
        Some(s) => Some(PaymentStatus::parse(s).ok_or_else(|| {
            api_error(&PaymentError::Validation(format!("Unknown payment status: {s}")))
        })?),
    };

    state
        .payments
        .list_payments(status, query.limit)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Payment history for one phone number
pub async fn payments_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let phone = PhoneNumber::parse(&phone).map_err(|e| api_error(&e))?;

    state
        .payments
        .history_for_phone(&phone, query.limit)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Counts and completed total
pub async fn payment_summary(
    State(state): State<AppState>,
) -> Result<Json<PaymentSummary>, ApiError> {
    state
        .payments
        .summary()
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// M-Pesa callback receiver.
///
/// Always answers 200; the body tells M-Pesa whether we could process it.
pub async fn mpesa_callback(State(state): State<AppState>, body: Body) -> Json<CallbackAck> {
    // Read past the default extractor limit so oversized bodies are still acknowledged
    let body = match to_bytes(body, CALLBACK_BODY_LIMIT).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable M-Pesa callback body");
            return Json(CallbackAck::internal_error());
        }
    };

    Json(state.payments.receive_callback(&body).await)
}
