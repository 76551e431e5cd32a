use tracing::{info, warn};

use super::{ResultsIngestor, ResultsOutcome};
use crate::clients::IndexKey;
use crate::constants::RESULTS_STATUS_ERROR;
use crate::models::ResultsPayload;
use crate::orchestration::errors::ResultsError;

impl ResultsIngestor {
    /// Replace one channel's documents in the primary index with a resync run's records
    ///
    /// Resync runs are not tied to a file: nothing is recorded and no one is notified.
    pub(super) async fn ingest_refresh(&self, payload: &ResultsPayload) -> Result<ResultsOutcome, ResultsError> {
        let Some(first) = payload.records.new.first() else {
            return Err(ResultsError::Invalid(format!(
                "resync run {} delivered no records",
                payload.flow_run_id
            )));
        };
        if payload.status == RESULTS_STATUS_ERROR {
            return Err(ResultsError::Invalid(format!(
                "resync run {} reported an error",
                payload.flow_run_id
            )));
        }

        let channel_id = first.channel_item_id;
        if let Some(reason) = payload.count_mismatch() {
            warn!(channel_id = channel_id, reason = %reason, "Rejecting resync results");
            return Err(ResultsError::Invalid(reason));
        }

        let search = &self.ctx.search;
        let removed = search.delete_by_channel(IndexKey::Patients, channel_id).await?;
        let stats = search
            .bulk_upsert(IndexKey::Patients, &payload.records.new, &payload.flow_run_id)
            .await?;

        info!(
            channel_id = channel_id,
            removed = removed,
            indexed = stats.succeeded,
            failed = stats.failed,
            "Channel resynced"
        );
        Ok(ResultsOutcome::Refreshed {
            channel_id,
            indexed: stats.succeeded,
        })
    }
}
