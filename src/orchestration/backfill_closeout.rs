use chrono::Utc;
use tracing::{info, instrument};

use super::context::PipelineContext;
use super::errors::AdminError;
use super::notification::ReportSender;
use crate::models::File;
use crate::state_machine::FileStatus;

/// Settles a channel's backfill file once the backfill service reports it finished
pub struct BackfillCloseout {
    ctx: PipelineContext,
    reports: ReportSender,
}

impl BackfillCloseout {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            reports: ReportSender::new(ctx.clone()),
            ctx,
        }
    }

    /// Mark the channel's processing backfill `processed` or `failed` and report it
    ///
    /// `matches` is the number of patients the backfill matched, when known.
    #[instrument(skip(self))]
    pub async fn close(&self, channel_id: i64, succeeded: bool, matches: Option<i64>) -> Result<File, AdminError> {
        let store = &self.ctx.store;

        let mut file = store
            .find_processing_file_for_channel(channel_id, true)
            .await?
            .ok_or(AdminError::NoBackfillInProgress(channel_id))?;

        file.status = if succeeded {
            FileStatus::Processed
        } else {
            FileStatus::Failed
        };
        file.processed_at = Some(Utc::now());
        store.update_file(&file).await?;

        info!(file_id = file.file_id, status = %file.status, matches = ?matches, "Backfill closed");
        self.reports.send_backfill_closeout(file.clone(), matches).await;
        Ok(file)
    }
}
