//! # Exchange Bucket
//!
//! Files are staged under `load/<partner bucket>/` in the shared exchange
//! bucket while the workflow engine works on them. Once a file settles they are
//! moved to `processed/` or `failed/` with the same relative path.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

use super::context::PipelineContext;
use super::result_codes::tag_file;
use crate::clients::{ExchangeLocation, ObjectStoreError};
use crate::constants::{folders, result_codes};
use crate::models::{File, PartnerFolder};
use crate::state_machine::FileStatus;

/// Collision-free staging key that keeps the file extension
pub fn staging_key(partner_bucket: &str, filename: &str, now: DateTime<Utc>) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000);
    let discriminator = &uuid::Uuid::new_v4().simple().to_string()[..8];

    format!(
        "{}/{partner_bucket}/{nanos}_{discriminator}{extension}",
        folders::LOAD
    )
}

/// Where a partner can find a file that could not be routed
pub fn failed_copy_key(partner_bucket: &str, filename: &str) -> String {
    format!("{}/{partner_bucket}/{filename}", folders::FAILED)
}

/// Whether `key` is an exchange staging key of the given partner bucket
pub fn is_staged_key(key: &str, partner_bucket: &str) -> bool {
    key.strip_prefix(folders::LOAD)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_prefix(partner_bucket))
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Destination of a staged object once its file settled in `status`
///
/// Returns `None` for keys outside the load area.
pub fn relocation_key(key: &str, status: FileStatus) -> Option<String> {
    let rest = key.strip_prefix(folders::LOAD)?.strip_prefix('/')?;
    Some(format!("{}/{rest}", status.relocation_folder()))
}

/// Moves partner files in and out of the exchange bucket
#[derive(Clone)]
pub struct Exchange {
    ctx: PipelineContext,
}

impl Exchange {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn bucket(&self) -> &str {
        &self.ctx.settings.exchange_bucket
    }

    pub fn location(&self, file: &File) -> ExchangeLocation {
        ExchangeLocation {
            bucket: self.bucket().to_string(),
            key: file.object_key.clone(),
        }
    }

    /// Copy the partner's object into the load area and return the new key
    pub async fn stage(
        &self,
        folder: &PartnerFolder,
        file: &File,
    ) -> Result<String, ObjectStoreError> {
        let key = staging_key(&folder.bucket_name, &file.filename, Utc::now());
        self.ctx
            .objects
            .copy(&folder.bucket_name, &file.object_key, self.bucket(), &key)
            .await?;

        debug!(file_id = file.file_id, exchange_key = %key, "File staged in exchange bucket");
        Ok(key)
    }

    /// Best-effort copy of an unroutable file to `failed/<bucket>/<filename>`
    pub async fn copy_to_failed(&self, folder: &PartnerFolder, file: &File) {
        let key = failed_copy_key(&folder.bucket_name, &file.filename);
        match self
            .ctx
            .objects
            .copy(&folder.bucket_name, &file.object_key, self.bucket(), &key)
            .await
        {
            Ok(()) => info!(file_id = file.file_id, key = %key, "Copied file to failed folder"),
            Err(e) => warn!(
                file_id = file.file_id,
                key = %key,
                error = %e,
                "Could not copy file to failed folder"
            ),
        }
    }

    /// Move a settled file out of the load area (copy, then delete)
    ///
    /// Re-reads the file so the destination follows its final status. A failed
    /// move is recorded as a result code and leaves the status untouched.
    #[instrument(skip(self), fields(file_id = file_id))]
    pub async fn relocate(&self, file_id: i64) {
        let store = &self.ctx.store;
        let mut file = match store.find_file(file_id).await {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Could not reload file for relocation");
                return;
            }
        };

        let staged = match store.find_partner_folder(file.partner_folder_id).await {
            Ok(folder) => is_staged_key(&file.object_key, &folder.bucket_name),
            Err(e) => {
                error!(error = %e, "Could not load partner folder for relocation");
                return;
            }
        };
        let destination = match relocation_key(&file.object_key, file.status) {
            Some(destination) if staged => destination,
            _ => {
                debug!(key = %file.object_key, "File is not staged, nothing to relocate");
                return;
            }
        };

        if let Err(e) = self.move_object(&file.object_key, &destination).await {
            tag_file(
                store,
                file.file_id,
                result_codes::EXCHANGE_MOVE_FAILED,
                &e.to_string(),
            )
            .await;
            return;
        }

        file.object_key = destination;
        if let Err(e) = store.update_file(&file).await {
            error!(error = %e, "Could not persist relocated key");
            return;
        }
        info!(key = %file.object_key, status = %file.status, "File relocated");
    }

    async fn move_object(&self, source: &str, destination: &str) -> Result<(), ObjectStoreError> {
        self.ctx
            .objects
            .copy(self.bucket(), source, self.bucket(), destination)
            .await?;
        self.ctx.objects.delete(self.bucket(), source).await
    }

    /// Remove a file's staged object, wherever it currently lives in the exchange
    pub async fn remove(&self, file: &File) -> Result<(), ObjectStoreError> {
        self.ctx.objects.delete(self.bucket(), &file.object_key).await
    }
}
