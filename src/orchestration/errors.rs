//! Error types of the ingestion pipeline stages.
//!
//! A stage error means the stage stopped; when a file was involved it has
//! already been marked and tagged with a result code by the time the error is
//! returned.

use thiserror::Error;

use crate::clients::{BackfillError, ObjectStoreError, SearchIndexError, WorkflowError};
use crate::database::StoreError;
use crate::models::ParameterError;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("No active template matches '{filename}' in partner folder {partner_folder_id}")]
    TemplateNotFound {
        filename: String,
        partner_folder_id: i64,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("No partner folder for bucket '{0}'")]
    PartnerNotFound(String),

    #[error("Partner folder for bucket '{0}' is deactivated")]
    PartnerInactive(String),

    #[error("Object key '{0}' is not valid URL escaping")]
    InvalidKey(String),

    #[error("File {file_id}: no template matches '{filename}'")]
    TemplateNotFound { file_id: i64, filename: String },

    #[error("File {file_id}: exchange copy failed: {reason}")]
    ExchangeCopyFailed { file_id: i64, reason: String },

    #[error("File {file_id}: could not check for files in processing: {reason}")]
    GateCheckFailed { file_id: i64, reason: String },

    #[error("File {file_id}: dispatch executor is shut down")]
    DispatchUnavailable { file_id: i64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("File {file_id}: workflow request could not be built: {source}")]
    Build {
        file_id: i64,
        #[source]
        source: WorkflowError,
    },

    #[error("File {file_id}: workflow submission failed: {source}")]
    Submit {
        file_id: i64,
        #[source]
        source: WorkflowError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum BackfillAdmissionError {
    #[error("there is already a backfill in progress for this partner (channel {channel_id})")]
    InProgress { channel_id: i64 },

    #[error("maximum number of running backfills has been reached ({running} of {limit})")]
    LimitReached { running: i64, limit: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload carries no filename")]
    MissingFilename,

    #[error("Invalid upload parameters: {0}")]
    InvalidParameters(#[from] ParameterError),

    #[error("Partner folder {0} is deactivated")]
    PartnerInactive(i64),

    #[error("No active template matches '{0}'")]
    TemplateNotFound(String),

    #[error(transparent)]
    BackfillRejected(#[from] BackfillAdmissionError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Results object '{0}' carries no correlation id")]
    MissingCorrelationId(String),

    #[error("Object '{0}' is not a results object")]
    NotAResultsObject(String),

    #[error("Failed to download results: {0}")]
    Download(#[from] ObjectStoreError),

    #[error("Failed to decode results: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No file correlates with flow run '{0}'")]
    UnknownFlowRun(String),

    #[error("Invalid results: {0}")]
    Invalid(String),

    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    #[error("Backfill could not be started: {0}")]
    Backfill(#[from] BackfillError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("No backfill in progress for channel {0}")]
    NoBackfillInProgress(i64),

    #[error("Channel {channel_id} does not belong to partner folder {partner_folder_id}")]
    ChannelNotInFolder {
        channel_id: i64,
        partner_folder_id: i64,
    },

    #[error("Partner folder {0} has no templates")]
    NoChannels(i64),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
