use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

use crate::web::errors::ApiResult;
use crate::web::events::BucketEvent;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    accepted: bool,
}

/// POST /api/v1/results/file
///
/// Answers as soon as the event is understood; ingestion runs on its own task.
pub async fn results_file(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AcceptedResponse>> {
    let object = BucketEvent::parse(&body)?.into_single_object()?;

    let service = state.service.clone();
    tokio::spawn(async move {
        match service.results().ingest(&object.bucket, &object.key).await {
            Ok(outcome) => debug!(?outcome, "Results ingested"),
            Err(e) => error!(key = %object.key, error = %e, "Results ingestion failed"),
        }
    });

    Ok(Json(AcceptedResponse { accepted: true }))
}
