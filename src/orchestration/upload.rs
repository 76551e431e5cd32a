//! # File Upload
//!
//! Files a partner hands over through the admin surface instead of dropping
//! them in their bucket. The upload registers the file as `new` with its
//! options and then writes the object; the bucket event that follows reaches
//! intake, which picks up the registered row instead of creating a second one.
//!
//! Backfills are admitted here, before anything is written.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::concurrency_gate::ConcurrencyGate;
use super::context::PipelineContext;
use super::errors::{MatchError, UploadError};
use super::source_file_intake::filename_from_key;
use super::template_matcher::TemplateMatcher;
use crate::constants::folders;
use crate::models::{File, FileParameters, NewFile};
use crate::state_machine::FileStatus;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub partner_folder_id: i64,
    pub filename: String,
    pub content: Vec<u8>,
    pub parameters: FileParameters,
}

/// Partner bucket key an uploaded file is written to
pub fn upload_key(filename: &str, now: DateTime<Utc>) -> String {
    format!("{}/{}/{filename}", folders::LOAD, now.timestamp())
}

pub struct FileUploadService {
    ctx: PipelineContext,
    matcher: TemplateMatcher,
    gate: Arc<ConcurrencyGate>,
}

impl FileUploadService {
    pub fn new(ctx: PipelineContext, gate: Arc<ConcurrencyGate>) -> Self {
        Self {
            matcher: TemplateMatcher::new(ctx.store.clone()),
            ctx,
            gate,
        }
    }

    #[instrument(skip(self, request), fields(partner_folder_id = request.partner_folder_id, filename = %request.filename))]
    pub async fn upload(&self, request: UploadRequest) -> Result<File, UploadError> {
        let UploadRequest {
            partner_folder_id,
            filename,
            content,
            parameters,
        } = request;

        let filename = filename_from_key(filename.trim()).to_string();
        if filename.is_empty() {
            return Err(UploadError::MissingFilename);
        }
        parameters.validate()?;

        let store = &self.ctx.store;
        let folder = store.find_partner_folder(partner_folder_id).await?;
        if folder.is_deactivated() {
            return Err(UploadError::PartnerInactive(partner_folder_id));
        }

        let template = match self.matcher.match_file(&filename, partner_folder_id).await {
            Ok(template) => template,
            Err(MatchError::TemplateNotFound { .. }) => return Err(UploadError::TemplateNotFound(filename)),
            Err(MatchError::Store(e)) => return Err(e.into()),
        };

        let is_backfill = parameters.is_backfill();
        if is_backfill {
            self.gate.admit_backfill(template.channel_id).await?;
        }

        let key = upload_key(&filename, Utc::now());
        let file = store
            .create_file(NewFile {
                filename,
                partner_folder_id,
                object_key: key.clone(),
                status: FileStatus::New,
                template_id: Some(template.template_id),
                is_backfill,
                file_parameters: parameters,
            })
            .await?;

        if let Err(e) = self.ctx.objects.put(&folder.bucket_name, &key, content).await {
            if let Err(cleanup) = store.delete_file(file.file_id).await {
                error!(file_id = file.file_id, error = %cleanup, "Failed to remove row of failed upload");
            }
            return Err(e.into());
        }

        info!(
            file_id = file.file_id,
            template_id = template.template_id,
            is_backfill = is_backfill,
            key = %key,
            "File uploaded"
        );
        Ok(file)
    }
}
