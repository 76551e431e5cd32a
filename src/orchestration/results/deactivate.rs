//! Partner deactivation results.
//!
//! The workflow engine has already removed the partner's rows upstream; here
//! each reported channel is wiped from the primary index, its files and staged
//! objects are deleted, and its templates are dropped. Channels are cleaned up
//! independently of each other.

use futures::future::join_all;
use tracing::{error, info, warn};

use super::{ResultsIngestor, ResultsOutcome};
use crate::clients::{DeletedReport, IndexKey};
use crate::models::DeleteResultsPayload;
use crate::orchestration::errors::ResultsError;

/// Folder id from a payload that did not decode as a whole
fn loose_folder_id(body: &[u8]) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("bucket_folder_id")?.as_i64()
}

/// Channel ids of the payload; keys that are not ids are logged and skipped
fn reported_channels(payload: &DeleteResultsPayload) -> Vec<i64> {
    payload
        .number_deleted_by_channel_item_id
        .keys()
        .filter_map(|key| match key.trim().parse::<i64>() {
            Ok(channel_id) => Some(channel_id),
            Err(e) => {
                warn!(channel = %key, error = %e, "Skipping malformed channel id");
                None
            }
        })
        .collect()
}

impl ResultsIngestor {
    pub(super) async fn ingest_delete(
        &self,
        bucket: &str,
        key: &str,
        correlation_id: &str,
    ) -> Result<ResultsOutcome, ResultsError> {
        let body = self.ctx.objects.get(bucket, key).await.map_err(|e| {
            error!(correlation_id = %correlation_id, error = %e, "Failed to download delete results");
            ResultsError::from(e)
        })?;

        let payload = match serde_json::from_slice::<DeleteResultsPayload>(&body) {
            Ok(payload) => payload,
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Failed to decode delete results");
                self.reactivate(loose_folder_id(&body)).await;
                return Err(e.into());
            }
        };

        let folder_id = payload.bucket_folder_id;
        let channels = reported_channels(&payload);
        let cleanups = join_all(
            channels
                .iter()
                .map(|&channel_id| self.remove_channel(folder_id, channel_id)),
        )
        .await;

        let mut channels_removed = 0;
        let mut channels_failed = 0;
        for (channel_id, cleanup) in channels.iter().zip(cleanups) {
            match cleanup {
                Ok(()) => channels_removed += 1,
                Err(e) => {
                    channels_failed += 1;
                    error!(channel_id = channel_id, error = %e, "Channel cleanup failed");
                }
            }
        }

        info!(
            partner_folder_id = folder_id,
            channels_removed = channels_removed,
            channels_failed = channels_failed,
            status = %payload.status,
            "Partner deactivation absorbed"
        );
        self.send_deleted_report(&payload).await;

        Ok(ResultsOutcome::Deactivated {
            partner_folder_id: folder_id,
            channels_removed,
            channels_failed,
        })
    }

    async fn reactivate(&self, folder_id: Option<i64>) {
        let Some(folder_id) = folder_id else {
            error!("Delete results carry no folder id, partner stays deactivated");
            return;
        };
        match self.ctx.store.set_partner_folder_deactivated(folder_id, false).await {
            Ok(()) => warn!(partner_folder_id = folder_id, "Partner folder reactivated"),
            Err(e) => error!(partner_folder_id = folder_id, error = %e, "Failed to reactivate partner folder"),
        }
    }

    async fn remove_channel(&self, folder_id: i64, channel_id: i64) -> Result<(), ResultsError> {
        let store = &self.ctx.store;

        let removed = self
            .ctx
            .search
            .delete_by_channel(IndexKey::Patients, channel_id)
            .await?;

        let files = store.find_files_for_channel(channel_id, folder_id).await?;
        for file in &files {
            if let Err(e) = self.exchange.remove(file).await {
                warn!(file_id = file.file_id, key = %file.object_key, error = %e, "Could not delete staged object");
            }
            store.delete_file(file.file_id).await?;
        }

        let templates = store.delete_templates_for_channel(channel_id).await?;
        info!(
            channel_id = channel_id,
            documents = removed,
            files = files.len(),
            templates = templates,
            "Channel removed"
        );
        Ok(())
    }

    async fn send_deleted_report(&self, payload: &DeleteResultsPayload) {
        let store = &self.ctx.store;
        let folder_id = payload.bucket_folder_id;

        let folder = match store.find_partner_folder(folder_id).await {
            Ok(folder) => folder,
            Err(e) => {
                error!(partner_folder_id = folder_id, error = %e, "Failed to load partner folder for report");
                return;
            }
        };
        let recipients = match store.partner_emails(folder_id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(partner_folder_id = folder_id, error = %e, "Failed to load report recipients");
                return;
            }
        };
        if recipients.is_empty() {
            return;
        }

        let report = DeletedReport {
            partner_name: folder.name,
            status: payload.status.clone(),
            deleted_by_channel: payload.number_deleted_by_channel_item_id.clone(),
            errors: payload.errors.clone(),
            recipients,
        };
        if let Err(e) = self.ctx.notifier.send_deleted_report(&report).await {
            error!(partner_folder_id = folder_id, error = %e, "Failed to send deleted report");
        }
    }
}
