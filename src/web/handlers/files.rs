use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use crate::orchestration::IntakeOutcome;
use crate::web::errors::ApiResult;
use crate::web::events::BucketEvent;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    file_id: i64,
    status: &'static str,
}

/// POST /api/v1/partners/file
///
/// Runs intake inline; the workflow submission itself continues after the response.
pub async fn partner_file(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<IntakeResponse>> {
    let object = BucketEvent::parse(&body)?.into_single_object()?;

    let outcome = state
        .service
        .intake()
        .ingest(&object.bucket, &object.key)
        .await
        .map_err(|e| {
            warn!(bucket = %object.bucket, key = %object.key, error = %e, "Intake failed");
            e
        })?;

    let status = match outcome {
        IntakeOutcome::Dispatched { .. } => "dispatched",
        IntakeOutcome::Waiting { .. } => "waiting",
    };
    info!(file_id = outcome.file_id(), status = status, "Partner file accepted");

    Ok(Json(IntakeResponse {
        file_id: outcome.file_id(),
        status,
    }))
}
