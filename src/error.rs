use thiserror::Error;

use crate::clients::{BackfillError, NotifierError, SearchIndexError, WorkflowError};
use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::orchestration::errors::{AdminError, IntakeError, ResultsError, UploadError};

/// Top-level error for callers that drive the service as a whole
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Intake error: {0}")]
    IntakeError(#[from] IntakeError),

    #[error("Results error: {0}")]
    ResultsError(#[from] ResultsError),

    #[error("Upload error: {0}")]
    UploadError(#[from] UploadError),

    #[error("Admin error: {0}")]
    AdminError(#[from] AdminError),

    #[error("Workflow engine error: {0}")]
    WorkflowError(#[from] WorkflowError),

    #[error("Search index error: {0}")]
    SearchIndexError(#[from] SearchIndexError),

    #[error("Backfill service error: {0}")]
    BackfillError(#[from] BackfillError),

    #[error("Mail service error: {0}")]
    NotifierError(#[from] NotifierError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
