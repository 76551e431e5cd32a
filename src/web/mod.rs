//! # Webhook Surface
//!
//! Axum router receiving bucket notifications.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /healthcheck` | store round trip |
//! | `POST /api/v1/partners/file` | a partner file arrived; runs intake |
//! | `POST /api/v1/results/file` | a results object arrived; ingested in the background |
//!
//! Malformed envelopes answer 400, intake failures 422.

pub mod errors;
pub mod events;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(handlers::health::healthcheck))
        .route("/api/v1/partners/file", post(handlers::files::partner_file))
        .route("/api/v1/results/file", post(handlers::results::results_file))
        .with_state(state)
}

/// Serve the router on `bind_address` until `shutdown` resolves
pub async fn serve(
    state: AppState,
    bind_address: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "🌐 Webhook server listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
