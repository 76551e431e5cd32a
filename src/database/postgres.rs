//! PostgreSQL implementation of [`FileStore`].
//!
//! Queries are built at runtime with `query_as::<_, Row>` so the crate builds
//! without a live database. Rows are decoded into private `*Row` structs and
//! converted into domain models, which is where text columns become enums.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::{debug, error};

use super::file_store::{FileStore, StoreError, StoreResult};
use crate::models::{
    CodeLevel, File, FileCounters, FileIdentifier, FileIdentifierType, FileParameters,
    FileResultCodeDetail, NewFile, NewFileResultCode, PartnerFolder, ResultCode, Template,
};
use crate::state_machine::FileStatus;

const FILE_COLUMNS: &str = "f.file_id, f.filename, f.partner_folder_id, f.object_key, f.status, \
     f.template_id, f.is_backfill, f.file_parameters, f.flow_run_id, f.patients_loaded, \
     f.patients_updated, f.patients_deleted, f.created_at, f.updated_at, f.processed_at";

const TEMPLATE_COLUMNS: &str = "template_id, name, file_identifier_type, file_identifier_value, \
     partner_folder_id, channel_id, market_id, column_mapping, is_active, updated_at";

#[derive(Debug, FromRow)]
struct FileRow {
    file_id: i64,
    filename: String,
    partner_folder_id: i64,
    object_key: String,
    status: String,
    template_id: Option<i64>,
    is_backfill: bool,
    file_parameters: Json<FileParameters>,
    flow_run_id: Option<String>,
    patients_loaded: i64,
    patients_updated: i64,
    patients_deleted: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<FileRow> for File {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let status = FileStatus::from_str(&row.status).map_err(|reason| {
            StoreError::CorruptRow {
                entity: "file",
                reason,
            }
        })?;

        Ok(File {
            file_id: row.file_id,
            filename: row.filename,
            partner_folder_id: row.partner_folder_id,
            object_key: row.object_key,
            status,
            template_id: row.template_id,
            is_backfill: row.is_backfill,
            file_parameters: row.file_parameters.0,
            flow_run_id: row.flow_run_id,
            counters: FileCounters {
                loaded: row.patients_loaded,
                updated: row.patients_updated,
                deleted: row.patients_deleted,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    template_id: i64,
    name: String,
    file_identifier_type: String,
    file_identifier_value: String,
    partner_folder_id: i64,
    channel_id: i64,
    market_id: i64,
    column_mapping: serde_json::Value,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = StoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let identifier_type =
            FileIdentifierType::from_str(&row.file_identifier_type).map_err(|reason| {
                StoreError::CorruptRow {
                    entity: "template",
                    reason,
                }
            })?;

        Ok(Template {
            template_id: row.template_id,
            name: row.name,
            file_identifier: FileIdentifier {
                identifier_type,
                value: row.file_identifier_value,
            },
            partner_folder_id: row.partner_folder_id,
            channel_id: row.channel_id,
            market_id: row.market_id,
            column_mapping: row.column_mapping,
            is_active: row.is_active,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PartnerFolderRow {
    partner_folder_id: i64,
    name: String,
    bucket_name: String,
    deactivated_at: Option<DateTime<Utc>>,
}

impl From<PartnerFolderRow> for PartnerFolder {
    fn from(row: PartnerFolderRow) -> Self {
        PartnerFolder {
            partner_folder_id: row.partner_folder_id,
            name: row.name,
            bucket_name: row.bucket_name,
            deactivated_at: row.deactivated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ResultCodeRow {
    result_code_id: i64,
    code: String,
    description: String,
    level: String,
}

impl TryFrom<ResultCodeRow> for ResultCode {
    type Error = StoreError;

    fn try_from(row: ResultCodeRow) -> Result<Self, Self::Error> {
        let level = CodeLevel::from_str(&row.level).map_err(|reason| StoreError::CorruptRow {
            entity: "result_code",
            reason,
        })?;

        Ok(ResultCode {
            result_code_id: row.result_code_id,
            code: row.code,
            description: row.description,
            level,
        })
    }
}

#[derive(Debug, FromRow)]
struct FileResultCodeRow {
    code: String,
    description: String,
    level: String,
    occurrences: i64,
    first_occurrence: Option<i64>,
    fields: Vec<String>,
    error: Option<String>,
}

impl TryFrom<FileResultCodeRow> for FileResultCodeDetail {
    type Error = StoreError;

    fn try_from(row: FileResultCodeRow) -> Result<Self, Self::Error> {
        let level = CodeLevel::from_str(&row.level).map_err(|reason| StoreError::CorruptRow {
            entity: "file_result_code",
            reason,
        })?;

        Ok(FileResultCodeDetail {
            code: row.code,
            description: row.description,
            level,
            occurrences: row.occurrences,
            first_occurrence: row.first_occurrence,
            fields: row.fields,
            error: row.error,
        })
    }
}

fn files_from_rows(rows: Vec<FileRow>) -> StoreResult<Vec<File>> {
    rows.into_iter().map(File::try_from).collect()
}

/// SQLx-backed file store
#[derive(Debug, Clone)]
pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_partner_folder(&self, partner_folder_id: i64) -> StoreResult<PartnerFolder> {
        sqlx::query_as::<_, PartnerFolderRow>(
            "SELECT partner_folder_id, name, bucket_name, deactivated_at \
             FROM partner_folders WHERE partner_folder_id = $1",
        )
        .bind(partner_folder_id)
        .fetch_optional(&self.pool)
        .await?
        .map(PartnerFolder::from)
        .ok_or_else(|| StoreError::not_found("partner folder", partner_folder_id))
    }

    async fn find_partner_folder_by_bucket(
        &self,
        bucket_name: &str,
    ) -> StoreResult<PartnerFolder> {
        sqlx::query_as::<_, PartnerFolderRow>(
            "SELECT partner_folder_id, name, bucket_name, deactivated_at \
             FROM partner_folders WHERE bucket_name = $1",
        )
        .bind(bucket_name)
        .fetch_optional(&self.pool)
        .await?
        .map(PartnerFolder::from)
        .ok_or_else(|| StoreError::not_found("partner folder", bucket_name))
    }

    async fn set_partner_folder_deactivated(
        &self,
        partner_folder_id: i64,
        deactivated: bool,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE partner_folders \
             SET deactivated_at = CASE WHEN $2 THEN NOW() ELSE NULL END, updated_at = NOW() \
             WHERE partner_folder_id = $1",
        )
        .bind(partner_folder_id)
        .bind(deactivated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("partner folder", partner_folder_id));
        }
        Ok(())
    }

    async fn partner_emails(&self, partner_folder_id: i64) -> StoreResult<Vec<String>> {
        let emails: Vec<(String,)> = sqlx::query_as(
            "SELECT email FROM partner_folder_emails \
             WHERE partner_folder_id = $1 ORDER BY partner_folder_email_id",
        )
        .bind(partner_folder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(emails.into_iter().map(|(email,)| email).collect())
    }

    async fn create_file(&self, new_file: NewFile) -> StoreResult<File> {
        let query = format!(
            "INSERT INTO files AS f (filename, partner_folder_id, object_key, status, template_id, \
             is_backfill, file_parameters) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {FILE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, FileRow>(&query)
            .bind(&new_file.filename)
            .bind(new_file.partner_folder_id)
            .bind(&new_file.object_key)
            .bind(new_file.status.as_str())
            .bind(new_file.template_id)
            .bind(new_file.is_backfill)
            .bind(Json(&new_file.file_parameters))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(filename = %new_file.filename, error = %e, "Failed to create file");
                StoreError::from(e)
            })?;

        File::try_from(row)
    }

    async fn update_file(&self, file: &File) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE files SET object_key = $2, status = $3, template_id = $4, \
             flow_run_id = $5, patients_loaded = $6, patients_updated = $7, \
             patients_deleted = $8, processed_at = $9, updated_at = NOW() \
             WHERE file_id = $1",
        )
        .bind(file.file_id)
        .bind(&file.object_key)
        .bind(file.status.as_str())
        .bind(file.template_id)
        .bind(&file.flow_run_id)
        .bind(file.counters.loaded)
        .bind(file.counters.updated)
        .bind(file.counters.deleted)
        .bind(file.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(file_id = file.file_id, error = %e, "Failed to update file");
            StoreError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("file", file.file_id));
        }

        debug!(file_id = file.file_id, status = %file.status, "File updated");
        Ok(())
    }

    async fn delete_file(&self, file_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM files WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_file(&self, file_id: i64) -> StoreResult<File> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files f WHERE f.file_id = $1");
        sqlx::query_as::<_, FileRow>(&query)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("file", file_id))
            .and_then(File::try_from)
    }

    async fn find_file_by_flow_run_id(&self, flow_run_id: &str) -> StoreResult<File> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files f WHERE f.flow_run_id = $1");
        sqlx::query_as::<_, FileRow>(&query)
            .bind(flow_run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("file", flow_run_id))
            .and_then(File::try_from)
    }

    async fn find_file_by_key(
        &self,
        partner_folder_id: i64,
        object_key: &str,
        status: FileStatus,
    ) -> StoreResult<Option<File>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             WHERE f.partner_folder_id = $1 AND f.object_key = $2 AND f.status = $3 \
             ORDER BY f.file_id DESC LIMIT 1"
        );
        sqlx::query_as::<_, FileRow>(&query)
            .bind(partner_folder_id)
            .bind(object_key)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(File::try_from)
            .transpose()
    }

    async fn find_processing_file_for_channel(
        &self,
        channel_id: i64,
        is_backfill: bool,
    ) -> StoreResult<Option<File>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             JOIN templates t ON t.template_id = f.template_id \
             WHERE t.channel_id = $1 AND f.status = $2 AND f.is_backfill = $3 \
             ORDER BY f.file_id LIMIT 1"
        );
        sqlx::query_as::<_, FileRow>(&query)
            .bind(channel_id)
            .bind(FileStatus::Processing.as_str())
            .bind(is_backfill)
            .fetch_optional(&self.pool)
            .await?
            .map(File::try_from)
            .transpose()
    }

    async fn find_oldest_waiting_file_for_channel(
        &self,
        channel_id: i64,
    ) -> StoreResult<Option<File>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             JOIN templates t ON t.template_id = f.template_id \
             WHERE t.channel_id = $1 AND f.status = $2 \
             ORDER BY f.created_at, f.file_id LIMIT 1"
        );
        sqlx::query_as::<_, FileRow>(&query)
            .bind(channel_id)
            .bind(FileStatus::Waiting.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(File::try_from)
            .transpose()
    }

    async fn count_processing_backfills(&self) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM files WHERE status = $1 AND is_backfill")
                .bind(FileStatus::Processing.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn find_files_for_channel(
        &self,
        channel_id: i64,
        partner_folder_id: i64,
    ) -> StoreResult<Vec<File>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             JOIN templates t ON t.template_id = f.template_id \
             WHERE t.channel_id = $1 AND f.partner_folder_id = $2 ORDER BY f.file_id"
        );
        let rows = sqlx::query_as::<_, FileRow>(&query)
            .bind(channel_id)
            .bind(partner_folder_id)
            .fetch_all(&self.pool)
            .await?;
        files_from_rows(rows)
    }

    async fn find_expired_files(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<File>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files f \
             WHERE f.status IN ($1, $2) AND NOT f.is_backfill AND f.updated_at < $3 \
             ORDER BY f.updated_at"
        );
        let rows = sqlx::query_as::<_, FileRow>(&query)
            .bind(FileStatus::Preprocess.as_str())
            .bind(FileStatus::Processing.as_str())
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        files_from_rows(rows)
    }

    async fn find_template(&self, template_id: i64) -> StoreResult<Template> {
        let query = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE template_id = $1");
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("template", template_id))
            .and_then(Template::try_from)
    }

    async fn active_templates_for_folder(
        &self,
        partner_folder_id: i64,
    ) -> StoreResult<Vec<Template>> {
        let query = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates \
             WHERE partner_folder_id = $1 AND is_active ORDER BY template_id"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&query)
            .bind(partner_folder_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Template::try_from).collect()
    }

    async fn delete_templates_for_channel(&self, channel_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM templates WHERE channel_id = $1")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_result_code(
        &self,
        code: &str,
        level: CodeLevel,
    ) -> StoreResult<Option<ResultCode>> {
        sqlx::query_as::<_, ResultCodeRow>(
            "SELECT result_code_id, code, description, level FROM result_codes \
             WHERE code = $1 AND level = $2",
        )
        .bind(code)
        .bind(level.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(ResultCode::try_from)
        .transpose()
    }

    async fn create_result_code(
        &self,
        code: &str,
        description: &str,
        level: CodeLevel,
    ) -> StoreResult<ResultCode> {
        // Concurrent attempts may race to create the same catalog entry
        let row = sqlx::query_as::<_, ResultCodeRow>(
            "INSERT INTO result_codes (code, description, level) VALUES ($1, $2, $3) \
             ON CONFLICT (code, level) DO UPDATE SET code = EXCLUDED.code \
             RETURNING result_code_id, code, description, level",
        )
        .bind(code)
        .bind(description)
        .bind(level.to_string())
        .fetch_one(&self.pool)
        .await?;

        ResultCode::try_from(row)
    }

    async fn add_file_result_code(&self, entry: NewFileResultCode) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO file_result_codes \
             (file_id, result_code_id, occurrences, first_occurrence, fields, error) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.file_id)
        .bind(entry.result_code_id)
        .bind(entry.occurrences)
        .bind(entry.first_occurrence)
        .bind(&entry.fields)
        .bind(&entry.error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(file_id = entry.file_id, error = %e, "Failed to record file result code");
            StoreError::from(e)
        })?;
        Ok(())
    }

    async fn file_result_codes(&self, file_id: i64) -> StoreResult<Vec<FileResultCodeDetail>> {
        let rows = sqlx::query_as::<_, FileResultCodeRow>(
            "SELECT rc.code, rc.description, rc.level, frc.occurrences, frc.first_occurrence, \
             frc.fields, frc.error \
             FROM file_result_codes frc \
             JOIN result_codes rc ON rc.result_code_id = frc.result_code_id \
             WHERE frc.file_id = $1 ORDER BY frc.file_result_code_id",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileResultCodeDetail::try_from).collect()
    }
}
