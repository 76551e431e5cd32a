//! # Search Index Client
//!
//! Patient population lives in an Elasticsearch-compatible index, one document
//! per patient hash. Backfill runs write to a separate index so they can be
//! validated without disturbing the live population.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::models::PatientRecord;

#[derive(Debug, Error)]
pub enum SearchIndexError {
    #[error("Search index request failed: {0}")]
    Request(String),

    #[error("Search index returned HTTP {status}: {message}")]
    Response { status: u16, message: String },

    #[error("Unexpected search index response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SearchIndexError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Patients,
    BackfillPatients,
}

/// Per-document outcome counts of a bulk request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    pub succeeded: usize,
    pub failed: usize,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Remove every document of a channel, returning how many were deleted
    async fn delete_by_channel(&self, index: IndexKey, channel_id: i64)
        -> Result<u64, SearchIndexError>;

    async fn bulk_upsert(
        &self,
        index: IndexKey,
        records: &[PatientRecord],
        flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError>;

    async fn bulk_delete(
        &self,
        index: IndexKey,
        patient_hashes: &[String],
        flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError>;

    async fn count_by_channel(&self, index: IndexKey, channel_id: i64)
        -> Result<u64, SearchIndexError>;
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
}

/// Elasticsearch REST client
#[derive(Debug, Clone)]
pub struct HttpSearchIndex {
    config: SearchConfig,
    client: reqwest::Client,
}

impl HttpSearchIndex {
    pub fn new(config: SearchConfig) -> Result<Self, SearchIndexError> {
        let client = super::http_client(config.timeout())
            .map_err(|e| SearchIndexError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn index_name(&self, index: IndexKey) -> &str {
        match index {
            IndexKey::Patients => &self.config.patients_index,
            IndexKey::BackfillPatients => &self.config.backfill_index,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, SearchIndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(SearchIndexError::Response {
            status: status.as_u16(),
            message: super::error_body(response).await,
        })
    }

    fn channel_query(channel_id: i64) -> serde_json::Value {
        json!({ "query": { "term": { "channel_item_id": channel_id.to_string() } } })
    }

    async fn send_bulk(&self, body: String) -> Result<BulkStats, SearchIndexError> {
        let response = self
            .client
            .post(self.url("_bulk?refresh=true"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let bulk: BulkResponse = response.json().await?;

        let mut stats = BulkStats::default();
        for item in bulk.items.iter().flat_map(|entry| entry.values()) {
            if item.status < 300 {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn delete_by_channel(
        &self,
        index: IndexKey,
        channel_id: i64,
    ) -> Result<u64, SearchIndexError> {
        let path = format!("{}/_delete_by_query?refresh=true", self.index_name(index));
        let response = self
            .client
            .post(self.url(&path))
            .json(&Self::channel_query(channel_id))
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let deleted: DeleteByQueryResponse = response.json().await?;

        debug!(channel_id = channel_id, deleted = deleted.deleted, "Channel removed from index");
        Ok(deleted.deleted)
    }

    async fn bulk_upsert(
        &self,
        index: IndexKey,
        records: &[PatientRecord],
        flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError> {
        if records.is_empty() {
            return Ok(BulkStats::default());
        }

        let index_name = self.index_name(index);
        let mut body = String::new();
        for record in records {
            let mut document = serde_json::to_value(record)
                .map_err(|e| SearchIndexError::Decode(e.to_string()))?;
            document["flow_run_id"] = json!(flow_run_id);

            body.push_str(
                &json!({ "index": { "_index": index_name, "_id": record.patient_hash } })
                    .to_string(),
            );
            body.push('\n');
            body.push_str(&document.to_string());
            body.push('\n');
        }

        let stats = self.send_bulk(body).await?;
        if stats.failed > 0 {
            warn!(flow_run_id = %flow_run_id, failed = stats.failed, "Bulk upsert had failures");
        }
        Ok(stats)
    }

    async fn bulk_delete(
        &self,
        index: IndexKey,
        patient_hashes: &[String],
        flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError> {
        if patient_hashes.is_empty() {
            return Ok(BulkStats::default());
        }

        let index_name = self.index_name(index);
        let mut body = String::new();
        for hash in patient_hashes {
            body.push_str(&json!({ "delete": { "_index": index_name, "_id": hash } }).to_string());
            body.push('\n');
        }

        let stats = self.send_bulk(body).await?;
        debug!(flow_run_id = %flow_run_id, deleted = stats.succeeded, "Bulk delete finished");
        Ok(stats)
    }

    async fn count_by_channel(
        &self,
        index: IndexKey,
        channel_id: i64,
    ) -> Result<u64, SearchIndexError> {
        let path = format!("{}/_count", self.index_name(index));
        let response = self
            .client
            .post(self.url(&path))
            .json(&Self::channel_query(channel_id))
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let count: CountResponse = response.json().await?;
        Ok(count.count)
    }
}
