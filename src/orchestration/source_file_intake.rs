//! # Source File Intake
//!
//! Entry point for a file that just landed in a partner bucket. Intake
//! registers the file, routes it to a template, stages it in the exchange
//! bucket and either queues it for dispatch or parks it behind the channel's
//! current file.
//!
//! Intake returns as soon as the file is queued; the workflow submission runs
//! on the dispatch executor.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::concurrency_gate::{ConcurrencyGate, GateDecision};
use super::context::PipelineContext;
use super::errors::{IntakeError, MatchError};
use super::exchange::Exchange;
use super::notification::{Population, ReportSender, ReportStage};
use super::result_codes::fail_file;
use super::template_matcher::TemplateMatcher;
use super::workflow_dispatcher::DispatchHandle;
use crate::constants::result_codes;
use crate::logging::log_file_operation;
use crate::models::{File, FileParameters, NewFile, PartnerFolder, Template};
use crate::state_machine::FileStatus;

/// Where intake left a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Queued for submission to the workflow engine
    Dispatched { file_id: i64 },
    /// Parked until the channel's processing file settles
    Waiting { file_id: i64 },
}

impl IntakeOutcome {
    pub fn file_id(&self) -> i64 {
        match self {
            Self::Dispatched { file_id } | Self::Waiting { file_id } => *file_id,
        }
    }
}

/// Decode an object key as delivered in bucket events (`+` is a space)
pub fn unescape_object_key(raw_key: &str) -> Result<String, IntakeError> {
    let spaced = raw_key.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| IntakeError::InvalidKey(raw_key.to_string()))
}

/// Last path segment of an object key
pub fn filename_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub struct SourceFileIntake {
    ctx: PipelineContext,
    matcher: TemplateMatcher,
    exchange: Exchange,
    gate: Arc<ConcurrencyGate>,
    dispatch: DispatchHandle,
    reports: ReportSender,
}

impl SourceFileIntake {
    pub fn new(ctx: PipelineContext, gate: Arc<ConcurrencyGate>, dispatch: DispatchHandle) -> Self {
        Self {
            matcher: TemplateMatcher::new(ctx.store.clone()),
            exchange: Exchange::new(ctx.clone()),
            reports: ReportSender::new(ctx.clone()),
            ctx,
            gate,
            dispatch,
        }
    }

    /// Register and route the object `raw_key` that arrived in `bucket`
    #[instrument(skip(self), fields(file_id = tracing::field::Empty))]
    pub async fn ingest(&self, bucket: &str, raw_key: &str) -> Result<IntakeOutcome, IntakeError> {
        let folder = match self.ctx.store.find_partner_folder_by_bucket(bucket).await {
            Ok(folder) => folder,
            Err(e) if e.is_not_found() => return Err(IntakeError::PartnerNotFound(bucket.to_string())),
            Err(e) => return Err(e.into()),
        };
        if folder.is_deactivated() {
            warn!(bucket = %bucket, "File arrived for a deactivated partner");
            return Err(IntakeError::PartnerInactive(bucket.to_string()));
        }

        let key = unescape_object_key(raw_key)?;
        let mut file = self.register(&folder, &key).await?;
        tracing::Span::current().record("file_id", file.file_id);

        let outcome = self.route(&folder, &mut file).await;

        self.reports
            .send_processing_report(file.file_id, ReportStage::PreProcess, Population::default())
            .await;
        outcome
    }

    /// Re-use the row of a retried event, or create one
    async fn register(&self, folder: &PartnerFolder, key: &str) -> Result<File, IntakeError> {
        let store = &self.ctx.store;

        if let Some(mut existing) = store
            .find_file_by_key(folder.partner_folder_id, key, FileStatus::New)
            .await?
        {
            existing.status = FileStatus::Preprocess;
            store.update_file(&existing).await?;
            debug!(file_id = existing.file_id, "Picked up registered file");
            return Ok(existing);
        }

        let file = store
            .create_file(NewFile {
                filename: filename_from_key(key).to_string(),
                partner_folder_id: folder.partner_folder_id,
                object_key: key.to_string(),
                status: FileStatus::Preprocess,
                template_id: None,
                is_backfill: false,
                file_parameters: FileParameters::default(),
            })
            .await?;
        log_file_operation(
            "register",
            file.file_id,
            &file.filename,
            file.status.as_str(),
            Some(key),
        );
        Ok(file)
    }

    async fn route(&self, folder: &PartnerFolder, file: &mut File) -> Result<IntakeOutcome, IntakeError> {
        let template = self.resolve_template(folder, file).await?;

        match self.exchange.stage(folder, file).await {
            Ok(key) => {
                file.object_key = key;
                self.ctx.store.update_file(file).await?;
            }
            Err(e) => {
                let reason = e.to_string();
                fail_file(&self.ctx.store, file, result_codes::EXCHANGE_COPY_FAILED, &reason).await;
                return Err(IntakeError::ExchangeCopyFailed {
                    file_id: file.file_id,
                    reason,
                });
            }
        }

        match self.gate.check(file, &template).await {
            Ok(GateDecision::Proceed) => {}
            Ok(GateDecision::Blocked { .. }) => {
                return Ok(IntakeOutcome::Waiting {
                    file_id: file.file_id,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                fail_file(&self.ctx.store, file, result_codes::GATE_CHECK_FAILED, &reason).await;
                return Err(IntakeError::GateCheckFailed {
                    file_id: file.file_id,
                    reason,
                });
            }
        }

        let file_id = file.file_id;
        if let Err(mut rejected) = self.dispatch.submit(file.clone(), template) {
            fail_file(
                &self.ctx.store,
                &mut rejected,
                result_codes::WORKFLOW_CALL_FAILED,
                "dispatch executor is shut down",
            )
            .await;
            *file = rejected;
            return Err(IntakeError::DispatchUnavailable { file_id });
        }
        Ok(IntakeOutcome::Dispatched { file_id })
    }

    async fn resolve_template(&self, folder: &PartnerFolder, file: &mut File) -> Result<Template, IntakeError> {
        let store = &self.ctx.store;

        if let Some(template_id) = file.template_id {
            let reason = match store.find_template(template_id).await {
                Ok(template) if template.is_active => return Ok(template),
                Ok(_) => "template is no longer active".to_string(),
                Err(e) if e.is_not_found() => e.to_string(),
                Err(e) => return Err(e.into()),
            };
            fail_file(store, file, result_codes::TEMPLATE_NOT_FOUND, &reason).await;
            return Err(IntakeError::TemplateNotFound {
                file_id: file.file_id,
                filename: file.filename.clone(),
            });
        }

        match self.matcher.match_file(&file.filename, folder.partner_folder_id).await {
            Ok(template) => {
                file.template_id = Some(template.template_id);
                store.update_file(file).await?;
                Ok(template)
            }
            Err(MatchError::TemplateNotFound { .. }) => {
                fail_file(
                    store,
                    file,
                    result_codes::TEMPLATE_NOT_FOUND,
                    "no active template matches the filename",
                )
                .await;
                self.exchange.copy_to_failed(folder, file).await;
                Err(IntakeError::TemplateNotFound {
                    file_id: file.file_id,
                    filename: file.filename.clone(),
                })
            }
            Err(MatchError::Store(e)) => Err(e.into()),
        }
    }
}
