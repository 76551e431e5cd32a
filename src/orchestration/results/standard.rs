//! Processing-run results.
//!
//! A results object is absorbed in three concurrent units that share one
//! result-code ledger: the search index sync, the row-level codes and the
//! file-level codes. The first unit to fail stops the other two; whatever they
//! already wrote stays written and the file is failed.
//!
//! Whatever happens after the file is correlated, the attempt ends with the
//! same epilogue: the staged object leaves the load area, the partner gets a
//! report, and for regular files the channel's next waiting file is dispatched.

use chrono::Utc;
use tracing::{error, info, warn};

use super::{ResultsIngestor, ResultsOutcome};
use crate::clients::IndexKey;
use crate::constants::result_codes;
use crate::models::{CodeLevel, File, FileCounters, FileError, ResultsPayload, RowError, Template};
use crate::orchestration::errors::ResultsError;
use crate::orchestration::notification::{Population, ReportStage};
use crate::orchestration::result_codes::{fail_file, tag_file, CodeEntry, ResultCodeLedger};
use crate::state_machine::FileStatus;

impl ResultsIngestor {
    pub(super) async fn ingest_standard(
        &self,
        bucket: &str,
        key: &str,
        correlation_id: &str,
    ) -> Result<ResultsOutcome, ResultsError> {
        let payload = match self.ctx.objects.get(bucket, key).await {
            Ok(body) => serde_json::from_slice::<ResultsPayload>(&body).map_err(ResultsError::from),
            Err(e) => Err(ResultsError::from(e)),
        };

        if let Ok(payload) = &payload {
            if payload.refresh {
                return self.ingest_refresh(payload).await;
            }
            if payload.flow_run_id != correlation_id {
                warn!(
                    correlation_id = %correlation_id,
                    payload_flow_run_id = %payload.flow_run_id,
                    "Results payload names a different run than its object"
                );
            }
        }

        let mut file = match self.ctx.store.find_file_by_flow_run_id(correlation_id).await {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                error!(
                    correlation_id = %correlation_id,
                    readable = payload.is_ok(),
                    "No file matched by workflow run id"
                );
                return Err(payload.err().unwrap_or(ResultsError::UnknownFlowRun(
                    correlation_id.to_string(),
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if file.status.is_terminal() {
            warn!(
                file_id = file.file_id,
                status = %file.status,
                "Results arrived for a file that already settled"
            );
        }
        info!(
            file_id = file.file_id,
            correlation_id = %correlation_id,
            elapsed_seconds = (Utc::now() - file.created_at).num_seconds(),
            "Results arrived"
        );

        let template = self.template_of(&file).await;
        let population = self.current_population(template.as_ref()).await;

        let outcome = match payload {
            Ok(payload) => self.absorb(&payload, &mut file, template.as_ref()).await,
            Err(e) => {
                let code = match &e {
                    ResultsError::Download(_) => result_codes::RESULTS_DOWNLOAD_FAILED,
                    _ => result_codes::RESULTS_DECODE_FAILED,
                };
                file.processed_at = Some(Utc::now());
                fail_file(&self.ctx.store, &mut file, code, &e.to_string()).await;
                Err(e)
            }
        };

        self.exchange.relocate(file.file_id).await;
        self.reports
            .send_processing_report(file.file_id, ReportStage::Completion, population)
            .await;
        if !file.is_backfill {
            if let Some(template) = &template {
                self.gate.drain(template).await;
            }
        }

        if let Err(e) = &outcome {
            error!(file_id = file.file_id, error = %e, "Results could not be absorbed");
        }
        outcome
    }

    async fn template_of(&self, file: &File) -> Option<Template> {
        let template_id = file.template_id?;
        match self.ctx.store.find_template(template_id).await {
            Ok(template) => Some(template),
            Err(e) => {
                error!(file_id = file.file_id, template_id = template_id, error = %e, "Could not load template of file");
                None
            }
        }
    }

    /// Channel population before this run's changes are applied
    async fn current_population(&self, template: Option<&Template>) -> Population {
        let Some(template) = template else {
            return Population(None);
        };
        match self
            .ctx
            .search
            .count_by_channel(IndexKey::Patients, template.channel_id)
            .await
        {
            Ok(count) => Population(i64::try_from(count).ok()),
            Err(e) => {
                error!(channel_id = template.channel_id, error = %e, "Could not read current population");
                Population(None)
            }
        }
    }

    async fn absorb(
        &self,
        payload: &ResultsPayload,
        file: &mut File,
        template: Option<&Template>,
    ) -> Result<ResultsOutcome, ResultsError> {
        let store = &self.ctx.store;

        if let Some(reason) = payload.count_mismatch() {
            fail_file(store, file, result_codes::RESULTS_INVALID, &reason).await;
            return Err(ResultsError::Invalid(reason));
        }

        let ledger = ResultCodeLedger::new(store.clone());
        let fan_out = tokio::try_join!(
            self.sync_index(payload, file, template),
            record_row_codes(&ledger, file.file_id, &payload.row_errors),
            record_file_codes(&ledger, file.file_id, &payload.file_errors),
        );
        if let Err(e) = fan_out {
            file.status = FileStatus::Failed;
            file.processed_at = Some(Utc::now());
            store.update_file(file).await?;
            return Err(e);
        }

        let counters = FileCounters {
            loaded: payload.number_new as i64,
            updated: payload.number_updated as i64,
            deleted: payload.number_deleted as i64,
        };

        if !payload.is_success() {
            file.status = FileStatus::from_results_status(&payload.status);
            file.processed_at = Some(Utc::now());
            store.update_file(file).await?;
            info!(file_id = file.file_id, status = %file.status, "Run did not succeed");
            return Ok(ResultsOutcome::Processed {
                file_id: file.file_id,
                status: file.status,
            });
        }

        if file.is_backfill {
            self.start_backfill(file, template).await?;
            file.counters = counters;
            file.status = FileStatus::Processing;
        } else {
            file.counters = counters;
            file.status = FileStatus::Processed;
            file.processed_at = Some(payload.processed_at.unwrap_or_else(Utc::now));
        }
        store.update_file(file).await?;

        info!(
            file_id = file.file_id,
            status = %file.status,
            loaded = counters.loaded,
            updated = counters.updated,
            deleted = counters.deleted,
            "Results absorbed"
        );
        Ok(ResultsOutcome::Processed {
            file_id: file.file_id,
            status: file.status,
        })
    }

    async fn start_backfill(&self, file: &mut File, template: Option<&Template>) -> Result<(), ResultsError> {
        let store = &self.ctx.store;

        let (Some(window), Some(template)) = (file.file_parameters.backfill_window(), template) else {
            let reason = "backfill window or template missing";
            fail_file(store, file, result_codes::BACKFILL_START_FAILED, reason).await;
            return Err(ResultsError::Invalid(reason.to_string()));
        };

        if let Err(e) = self.ctx.backfill.start(template.channel_id, window).await {
            fail_file(store, file, result_codes::BACKFILL_START_FAILED, &e.to_string()).await;
            return Err(e.into());
        }

        info!(
            file_id = file.file_id,
            channel_id = template.channel_id,
            start_date = %window.start_date,
            end_date = %window.end_date,
            "Backfill started"
        );
        Ok(())
    }

    async fn sync_index(
        &self,
        payload: &ResultsPayload,
        file: &File,
        template: Option<&Template>,
    ) -> Result<(), ResultsError> {
        let search = &self.ctx.search;
        let records = &payload.records;

        if file.is_backfill {
            let channel_id = template
                .map(|t| t.channel_id)
                .or_else(|| records.new.first().map(|r| r.channel_item_id))
                .ok_or_else(|| ResultsError::Invalid("backfill results without a channel".to_string()))?;

            let removed = search
                .delete_by_channel(IndexKey::BackfillPatients, channel_id)
                .await?;
            let stats = search
                .bulk_upsert(IndexKey::BackfillPatients, &records.new, &payload.flow_run_id)
                .await?;
            info!(
                file_id = file.file_id,
                channel_id = channel_id,
                removed = removed,
                indexed = stats.succeeded,
                "Backfill index rebuilt"
            );
            return Ok(());
        }

        if !records.deleted.is_empty() {
            match search
                .bulk_delete(IndexKey::Patients, &records.deleted, &payload.flow_run_id)
                .await
            {
                Ok(stats) if stats.succeeded != records.deleted.len() => warn!(
                    file_id = file.file_id,
                    expected = records.deleted.len(),
                    deleted = stats.succeeded,
                    "Deleted count differs from results"
                ),
                Ok(_) => {}
                Err(e) => {
                    tag_file(&self.ctx.store, file.file_id, result_codes::INDEX_DELETE_FAILED, &e.to_string()).await;
                    return Err(e.into());
                }
            }
        }

        if !records.new.is_empty() {
            match search
                .bulk_upsert(IndexKey::Patients, &records.new, &payload.flow_run_id)
                .await
            {
                Ok(stats) if stats.succeeded != records.new.len() => warn!(
                    file_id = file.file_id,
                    expected = records.new.len(),
                    indexed = stats.succeeded,
                    "Indexed count differs from results"
                ),
                Ok(_) => {}
                Err(e) => {
                    tag_file(&self.ctx.store, file.file_id, result_codes::INDEX_ADD_FAILED, &e.to_string()).await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

async fn record_row_codes(ledger: &ResultCodeLedger, file_id: i64, row_errors: &[RowError]) -> Result<(), ResultsError> {
    for row_error in row_errors {
        ledger
            .record(
                file_id,
                CodeEntry {
                    code: row_error.error_code.clone(),
                    level: CodeLevel::Row,
                    description: row_error.error.clone(),
                    occurrences: row_error.number_failed,
                    first_occurrence: Some(row_error.first_occurrence),
                    fields: vec![row_error.field.clone()],
                    error: Some(row_error.error.clone()),
                },
            )
            .await?;
    }
    Ok(())
}

async fn record_file_codes(ledger: &ResultCodeLedger, file_id: i64, file_errors: &[FileError]) -> Result<(), ResultsError> {
    for file_error in file_errors {
        if result_codes::is_uncaught(&file_error.error_code) {
            error!(
                file_id = file_id,
                result_code = %file_error.error_code,
                error = %file_error.error,
                "Workflow run hit an uncaught error"
            );
        }

        ledger
            .record(
                file_id,
                CodeEntry {
                    code: file_error.error_code.clone(),
                    level: CodeLevel::File,
                    description: file_error.error.clone(),
                    occurrences: 1,
                    first_occurrence: None,
                    fields: file_error.fields.clone(),
                    error: Some(file_error.error.clone()),
                },
            )
            .await?;
    }
    Ok(())
}
