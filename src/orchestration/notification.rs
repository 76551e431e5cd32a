//! Partner processing reports.
//!
//! Reports are best effort: every failure is logged and swallowed.

use tracing::{debug, error, info};

use super::context::PipelineContext;
use crate::clients::ProcessingReport;
use crate::models::{File, FileResultCodeDetail};

/// When a report is being sent, which decides whether it is worth sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStage {
    /// Intake or drain returned; only failures are reported
    PreProcess,
    /// Results were absorbed; backfills only report failures
    Completion,
}

/// Channel population before the results were applied, if it could be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Population(pub Option<i64>);

#[derive(Clone)]
pub struct ReportSender {
    ctx: PipelineContext,
}

impl ReportSender {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn send_processing_report(&self, file_id: i64, stage: ReportStage, population: Population) {
        let store = &self.ctx.store;

        let result_codes = match store.file_result_codes(file_id).await {
            Ok(codes) => codes,
            Err(e) if stage == ReportStage::PreProcess => {
                debug!(file_id = file_id, error = %e, "No result codes readable, skipping report");
                return;
            }
            Err(e) => {
                error!(file_id = file_id, error = %e, "Failed to load result codes for report");
                return;
            }
        };
        if stage == ReportStage::PreProcess && result_codes.is_empty() {
            return;
        }

        let file = match store.find_file(file_id).await {
            Ok(file) => file,
            Err(e) => {
                error!(file_id = file_id, error = %e, "Failed to load file for report");
                return;
            }
        };
        if file.is_backfill && result_codes.is_empty() {
            return;
        }

        let total_population = population
            .0
            .map(|current| current + file.counters.loaded - file.counters.deleted);

        info!(
            file_id = file.file_id,
            filename = %file.filename,
            status = %file.status,
            loaded = file.counters.loaded,
            updated = file.counters.updated,
            deleted = file.counters.deleted,
            total_population = ?total_population,
            result_codes = result_codes.len(),
            "File output"
        );

        self.deliver(file, result_codes, total_population, None).await;
    }

    /// Report the end of a backfill, whatever result codes it carries
    pub async fn send_backfill_closeout(&self, file: File, backfill_matches: Option<i64>) {
        let result_codes = match self.ctx.store.file_result_codes(file.file_id).await {
            Ok(codes) => codes,
            Err(e) => {
                error!(file_id = file.file_id, error = %e, "Failed to load result codes for report");
                Vec::new()
            }
        };
        self.deliver(file, result_codes, None, backfill_matches).await;
    }

    async fn deliver(
        &self,
        file: File,
        result_codes: Vec<FileResultCodeDetail>,
        total_population: Option<i64>,
        backfill_matches: Option<i64>,
    ) {
        let store = &self.ctx.store;
        let file_id = file.file_id;

        let folder = match store.find_partner_folder(file.partner_folder_id).await {
            Ok(folder) => folder,
            Err(e) => {
                error!(file_id = file_id, error = %e, "Failed to load partner folder for report");
                return;
            }
        };
        let recipients = match store.partner_emails(folder.partner_folder_id).await {
            Ok(recipients) if recipients.is_empty() => {
                debug!(partner_folder_id = folder.partner_folder_id, "No report recipients");
                return;
            }
            Ok(recipients) => recipients,
            Err(e) => {
                error!(
                    partner_folder_id = folder.partner_folder_id,
                    error = %e,
                    "Failed to load report recipients"
                );
                return;
            }
        };

        let report = ProcessingReport {
            partner_name: folder.name,
            filename: file.filename,
            status: file.status,
            is_backfill: file.is_backfill,
            result_codes,
            counters: file.counters,
            total_population,
            backfill_matches,
            recipients,
        };

        if let Err(e) = self.ctx.notifier.send_processing_report(&report).await {
            error!(file_id = file_id, error = %e, "Failed to send processing report");
        }
    }
}
