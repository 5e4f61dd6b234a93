//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    get_payment, health_check, initiate_payment, list_payments, mpesa_callback, payment_summary,
    payments_by_phone,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))

        // Payments
        .route("/api/payments", post(initiate_payment).get(list_payments))
        .route("/api/payments/summary", get(payment_summary))
        .route("/api/payments/phone/{phone}", get(payments_by_phone))
        .route("/api/payments/{id}", get(get_payment))

        // Gateway callback
        .route(mpesa_payments::config::CALLBACK_PATH, post(mpesa_callback))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
