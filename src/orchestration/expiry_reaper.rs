//! # Expiry Reaper
//!
//! Fails files that sat in `preprocess` or `processing` for longer than the
//! configured threshold, most often because the workflow engine never reported
//! back. A reaped file is relocated like any settled file. Reaping a
//! `processing` file frees its channel, so the channel is drained afterwards.
//!
//! Backfill files are never reaped; they stay `processing` until their
//! backfill is closed out.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::concurrency_gate::ConcurrencyGate;
use super::context::PipelineContext;
use super::exchange::Exchange;
use super::result_codes::fail_file;
use crate::constants::result_codes;
use crate::database::StoreResult;
use crate::models::File;
use crate::state_machine::FileStatus;

/// Files touched by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<i64>,
    pub channels_drained: usize,
}

pub struct ExpiryReaper {
    ctx: PipelineContext,
    exchange: Exchange,
    gate: Arc<ConcurrencyGate>,
}

impl ExpiryReaper {
    pub fn new(ctx: PipelineContext, gate: Arc<ConcurrencyGate>) -> Self {
        Self {
            exchange: Exchange::new(ctx.clone()),
            ctx,
            gate,
        }
    }

    /// Run one sweep
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let threshold = self.ctx.settings.expiry_threshold;
        let cutoff = Utc::now() - threshold;
        let candidates = self.ctx.store.find_expired_files(cutoff).await?;

        let mut report = SweepReport::default();
        for file in candidates {
            if file.is_backfill || !file.status.is_transient() {
                debug!(file_id = file.file_id, status = %file.status, "Skipping non-expirable file");
                continue;
            }
            let file_id = file.file_id;
            if self.expire(file).await {
                report.channels_drained += 1;
            }
            report.expired.push(file_id);
        }

        if !report.expired.is_empty() {
            info!(
                expired = report.expired.len(),
                channels_drained = report.channels_drained,
                threshold_minutes = threshold.num_minutes(),
                "Expired stale files"
            );
        }
        Ok(report)
    }

    /// Returns whether the file's channel was drained
    async fn expire(&self, mut file: File) -> bool {
        let held_channel = file.status == FileStatus::Processing;
        let reason = format!(
            "no progress since {} while {}",
            file.updated_at.to_rfc3339(),
            file.status
        );

        file.processed_at = Some(Utc::now());
        fail_file(&self.ctx.store, &mut file, result_codes::EXPIRED, &reason).await;
        self.exchange.relocate(file.file_id).await;

        if !held_channel {
            return false;
        }
        let Some(template_id) = file.template_id else {
            return false;
        };
        match self.ctx.store.find_template(template_id).await {
            Ok(template) => {
                self.gate.drain(&template).await;
                true
            }
            Err(e) => {
                warn!(file_id = file.file_id, error = %e, "Could not load template to drain channel");
                false
            }
        }
    }

    /// Sweep every `interval` until `shutdown` flips to true or its sender is dropped
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_seconds = interval.as_secs(), "Expiry reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Expiry sweep failed, retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Expiry reaper stopped");
    }
}
