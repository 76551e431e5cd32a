use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
}

/// GET /healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.service.context().store.ping().await.map_err(|e| {
        error!(error = %e, "Health check failed: store unreachable");
        ApiError::ServiceUnavailable
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
