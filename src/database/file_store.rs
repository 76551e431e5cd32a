use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    CodeLevel, File, FileResultCodeDetail, NewFile, NewFileResultCode, PartnerFolder,
    ResultCode, Template,
};
use crate::state_machine::FileStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row in {entity}: {reason}")]
    CorruptRow { entity: &'static str, reason: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract of the ingestion pipeline
///
/// A file's channel is the channel of its template; files without a template
/// never take part in channel lookups.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Partner folders

    async fn find_partner_folder(&self, partner_folder_id: i64) -> StoreResult<PartnerFolder>;

    async fn find_partner_folder_by_bucket(&self, bucket_name: &str)
        -> StoreResult<PartnerFolder>;

    async fn set_partner_folder_deactivated(
        &self,
        partner_folder_id: i64,
        deactivated: bool,
    ) -> StoreResult<()>;

    async fn partner_emails(&self, partner_folder_id: i64) -> StoreResult<Vec<String>>;

    // Files

    async fn create_file(&self, new_file: NewFile) -> StoreResult<File>;

    /// Persist every mutable column of `file` and bump `updated_at`
    async fn update_file(&self, file: &File) -> StoreResult<()>;

    async fn delete_file(&self, file_id: i64) -> StoreResult<()>;

    async fn find_file(&self, file_id: i64) -> StoreResult<File>;

    async fn find_file_by_flow_run_id(&self, flow_run_id: &str) -> StoreResult<File>;

    async fn find_file_by_key(
        &self,
        partner_folder_id: i64,
        object_key: &str,
        status: FileStatus,
    ) -> StoreResult<Option<File>>;

    /// A `processing` file of the channel with the given backfill flag, if any
    async fn find_processing_file_for_channel(
        &self,
        channel_id: i64,
        is_backfill: bool,
    ) -> StoreResult<Option<File>>;

    async fn find_oldest_waiting_file_for_channel(&self, channel_id: i64)
        -> StoreResult<Option<File>>;

    async fn count_processing_backfills(&self) -> StoreResult<i64>;

    async fn find_files_for_channel(
        &self,
        channel_id: i64,
        partner_folder_id: i64,
    ) -> StoreResult<Vec<File>>;

    /// Non-backfill files in a transient status not updated since `older_than`
    async fn find_expired_files(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<File>>;

    // Templates

    async fn find_template(&self, template_id: i64) -> StoreResult<Template>;

    async fn active_templates_for_folder(&self, partner_folder_id: i64)
        -> StoreResult<Vec<Template>>;

    async fn delete_templates_for_channel(&self, channel_id: i64) -> StoreResult<u64>;

    // Result codes

    async fn find_result_code(&self, code: &str, level: CodeLevel)
        -> StoreResult<Option<ResultCode>>;

    async fn create_result_code(
        &self,
        code: &str,
        description: &str,
        level: CodeLevel,
    ) -> StoreResult<ResultCode>;

    async fn add_file_result_code(&self, entry: NewFileResultCode) -> StoreResult<()>;

    async fn file_result_codes(&self, file_id: i64) -> StoreResult<Vec<FileResultCodeDetail>>;
}
