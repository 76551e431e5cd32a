//! # Results Ingestion
//!
//! The workflow engine reports back by writing a JSON object into the exchange
//! bucket. The object name carries the run id the file was dispatched with:
//!
//! - `<run id>__results.json`: the outcome of a processing run, or of a channel
//!   resync when the payload has `refresh` set
//! - `<run id>__delete_results.json`: the outcome of a partner deactivation
//!
//! Each variant lives in its own submodule.

mod deactivate;
mod refresh;
mod standard;

use std::sync::Arc;
use tracing::{error, instrument};

use super::concurrency_gate::ConcurrencyGate;
use super::context::PipelineContext;
use super::errors::ResultsError;
use super::exchange::Exchange;
use super::notification::ReportSender;
use super::source_file_intake::filename_from_key;
use crate::constants::{DELETE_RESULTS_SUFFIX, RESULTS_SUFFIX};
use crate::state_machine::FileStatus;

/// Which payload a results object holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsObject {
    Standard { correlation_id: String },
    Delete { correlation_id: String },
}

impl ResultsObject {
    /// Classify an object key by its name suffix
    pub fn from_key(key: &str) -> Result<Self, ResultsError> {
        let name = filename_from_key(key);

        let (correlation_id, is_delete) = if let Some(id) = name.strip_suffix(DELETE_RESULTS_SUFFIX) {
            (id, true)
        } else if let Some(id) = name.strip_suffix(RESULTS_SUFFIX) {
            (id, false)
        } else {
            return Err(ResultsError::NotAResultsObject(key.to_string()));
        };

        if correlation_id.is_empty() {
            return Err(ResultsError::MissingCorrelationId(key.to_string()));
        }

        let correlation_id = correlation_id.to_string();
        Ok(if is_delete {
            Self::Delete { correlation_id }
        } else {
            Self::Standard { correlation_id }
        })
    }
}

/// What a results object changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsOutcome {
    /// A file's run was absorbed and the file settled (or a backfill started)
    Processed { file_id: i64, status: FileStatus },
    /// A resync replaced a channel's documents in the primary index
    Refreshed { channel_id: i64, indexed: usize },
    /// A deactivation run was cleaned up
    Deactivated {
        partner_folder_id: i64,
        channels_removed: usize,
        channels_failed: usize,
    },
}

pub struct ResultsIngestor {
    ctx: PipelineContext,
    exchange: Exchange,
    gate: Arc<ConcurrencyGate>,
    reports: ReportSender,
}

impl ResultsIngestor {
    pub fn new(ctx: PipelineContext, gate: Arc<ConcurrencyGate>) -> Self {
        Self {
            exchange: Exchange::new(ctx.clone()),
            reports: ReportSender::new(ctx.clone()),
            ctx,
            gate,
        }
    }

    /// Absorb the results object `key` written to `bucket`
    #[instrument(skip(self))]
    pub async fn ingest(&self, bucket: &str, key: &str) -> Result<ResultsOutcome, ResultsError> {
        let object = ResultsObject::from_key(key).map_err(|e| {
            error!(error = %e, "Ignoring results object");
            e
        })?;

        match object {
            ResultsObject::Standard { correlation_id } => {
                self.ingest_standard(bucket, key, &correlation_id).await
            }
            ResultsObject::Delete { correlation_id } => {
                self.ingest_delete(bucket, key, &correlation_id).await
            }
        }
    }
}
