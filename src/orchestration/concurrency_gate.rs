//! # Concurrency Gate
//!
//! Keeps at most one non-backfill file per channel in `processing`.
//!
//! The gate holds no state of its own: every check re-reads the file rows. A
//! file that finds its channel busy is parked in `waiting`; when the busy file
//! settles, [`ConcurrencyGate::drain`] dispatches the oldest waiting file of the
//! channel.
//!
//! Check and dispatch are separate statements, so two files of an idle channel
//! arriving at the same instant can both pass the check.
//!
//! A waiting file whose template is missing or inactive is failed during the
//! drain and reported to the partner. If that failure cannot be persisted the
//! drain stops rather than reading the same row again.
//!
//! Backfills never wait. They are admitted or rejected up front by
//! [`ConcurrencyGate::admit_backfill`]: one backfill per channel and a global
//! ceiling on running backfills.

use tracing::{debug, error, info, instrument, warn};

use super::context::PipelineContext;
use super::errors::BackfillAdmissionError;
use super::notification::{Population, ReportSender, ReportStage};
use super::result_codes::tag_file;
use super::workflow_dispatcher::DispatchHandle;
use crate::constants::result_codes;
use crate::database::StoreResult;
use crate::models::{File, Template};
use crate::state_machine::FileStatus;

/// Outcome of a gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The channel is free, dispatch now
    Proceed,
    /// Another file of the channel is processing; this one is now `waiting`
    Blocked { processing_file_id: i64 },
}

pub struct ConcurrencyGate {
    ctx: PipelineContext,
    dispatch: DispatchHandle,
    reports: ReportSender,
}

impl ConcurrencyGate {
    pub fn new(ctx: PipelineContext, dispatch: DispatchHandle) -> Self {
        Self {
            reports: ReportSender::new(ctx.clone()),
            ctx,
            dispatch,
        }
    }

    /// Decide whether `file` may be dispatched now, parking it in `waiting` if not
    pub async fn check(&self, file: &mut File, template: &Template) -> StoreResult<GateDecision> {
        if file.is_backfill {
            return Ok(GateDecision::Proceed);
        }

        let processing = self
            .ctx
            .store
            .find_processing_file_for_channel(template.channel_id, false)
            .await?;

        match processing {
            Some(other) if other.file_id != file.file_id => {
                file.status = FileStatus::Waiting;
                self.ctx.store.update_file(file).await?;
                info!(
                    file_id = file.file_id,
                    channel_id = template.channel_id,
                    processing_file_id = other.file_id,
                    "Channel busy, file is waiting"
                );
                Ok(GateDecision::Blocked {
                    processing_file_id: other.file_id,
                })
            }
            _ => Ok(GateDecision::Proceed),
        }
    }

    /// Reject a new backfill for `channel_id` when one is running there or the ceiling is hit
    pub async fn admit_backfill(&self, channel_id: i64) -> Result<(), BackfillAdmissionError> {
        let store = &self.ctx.store;

        if store
            .find_processing_file_for_channel(channel_id, true)
            .await?
            .is_some()
        {
            return Err(BackfillAdmissionError::InProgress { channel_id });
        }

        let running = store.count_processing_backfills().await?;
        let limit = self.ctx.settings.max_parallel_backfills;
        if running >= i64::from(limit) {
            return Err(BackfillAdmissionError::LimitReached { running, limit });
        }

        debug!(channel_id = channel_id, running = running, limit = limit, "Backfill admitted");
        Ok(())
    }

    /// Dispatch the oldest waiting file of the channel `completed` belongs to
    ///
    /// Does nothing while another file of the channel is still processing. A
    /// waiting file whose own template is missing or inactive is failed and the
    /// next one is tried.
    #[instrument(skip_all, fields(channel_id = completed.channel_id))]
    pub async fn drain(&self, completed: &Template) {
        let store = &self.ctx.store;
        let channel_id = completed.channel_id;

        match store.find_processing_file_for_channel(channel_id, false).await {
            Ok(Some(busy)) => {
                debug!(processing_file_id = busy.file_id, "Channel still busy, nothing to drain");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Could not check channel before draining");
                return;
            }
        }

        loop {
            let mut next = match store.find_oldest_waiting_file_for_channel(channel_id).await {
                Ok(Some(file)) => file,
                Ok(None) => {
                    debug!("No waiting files");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Could not load next waiting file");
                    return;
                }
            };

            let template = match next.template_id {
                Some(id) if id == completed.template_id && completed.is_active => completed.clone(),
                Some(id) => match store.find_template(id).await {
                    Ok(template) if template.is_active => template,
                    Ok(_) => {
                        if self.fail_waiting(&mut next, "template is no longer active").await {
                            continue;
                        }
                        return;
                    }
                    Err(e) if e.is_not_found() => {
                        if self.fail_waiting(&mut next, &e.to_string()).await {
                            continue;
                        }
                        return;
                    }
                    Err(e) => {
                        error!(file_id = next.file_id, error = %e, "Could not reload template of waiting file");
                        return;
                    }
                },
                None => {
                    if self.fail_waiting(&mut next, "waiting file has no template").await {
                        continue;
                    }
                    return;
                }
            };

            info!(file_id = next.file_id, template_id = template.template_id, "Dispatching waiting file");
            if let Err(file) = self.dispatch.submit(next, template) {
                error!(file_id = file.file_id, "Dispatch executor is shut down, file stays waiting");
            }
            return;
        }
    }

    /// Fail and report a waiting file; false when its new status could not be stored
    async fn fail_waiting(&self, file: &mut File, reason: &str) -> bool {
        warn!(file_id = file.file_id, reason = %reason, "Waiting file lost its template");

        file.status = FileStatus::Failed;
        if let Err(e) = self.ctx.store.update_file(file).await {
            error!(file_id = file.file_id, error = %e, "Could not fail waiting file, stopping drain");
            return false;
        }
        tag_file(&self.ctx.store, file.file_id, result_codes::TEMPLATE_NOT_FOUND, reason).await;
        self.reports
            .send_processing_report(file.file_id, ReportStage::PreProcess, Population::default())
            .await;
        true
    }
}
