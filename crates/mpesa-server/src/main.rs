//! M-Pesa STK Push Server
//!
//! Axum server exposing payment initiation, payment queries and the
//! M-Pesa callback endpoint.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mpesa_payments::{
    DarajaClient, GatewayConfig, MemoryPaymentStore, PaymentOrchestrator, PaymentStore,
    SqlitePaymentStore,
};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Initialize storage
    let store: Arc<dyn PaymentStore> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!(database_url = %url, "Using SQLite payment store");
            Arc::new(SqlitePaymentStore::connect(url).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - payments are kept in memory only");
            Arc::new(MemoryPaymentStore::new())
        }
    };

    // Initialize gateway
    let orchestrator = match GatewayConfig::from_env() {
        Ok(gateway_config) => {
            let callback_url = gateway_config.callback_url();
            tracing::info!(
                shortcode = %gateway_config.shortcode,
                base_url = %gateway_config.base_url,
                callback_url = %callback_url,
                "M-Pesa configured"
            );
            PaymentOrchestrator::new(store, Arc::new(DarajaClient::new(gateway_config)), callback_url)
        }
        Err(e) => {
            tracing::warn!(error = %e, "M-Pesa not configured - payment initiation disabled");
            tracing::warn!("  Set MPESA_CONSUMER_KEY, MPESA_CONSUMER_SECRET, MPESA_SHORTCODE,");
            tracing::warn!("  MPESA_PASSKEY and MPESA_CALLBACK_BASE_URL in .env");
            PaymentOrchestrator::without_gateway(store)
        }
    };

    let app = routes::router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("mpesa-server listening on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     - Health check");
    tracing::info!("  POST /api/payments               - Initiate STK push");
    tracing::info!("  GET  /api/payments               - Latest payments (?status=)");
    tracing::info!("  GET  /api/payments/summary       - Payment counts");
    tracing::info!("  GET  /api/payments/phone/{{phone}} - History for a phone");
    tracing::info!("  GET  /api/payments/{{id}}          - Payment status");
    tracing::info!("  POST /api/mpesa-callback         - M-Pesa callback");

    axum::serve(listener, app).await?;

    Ok(())
}
