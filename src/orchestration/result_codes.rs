//! # Result-Code Ledger
//!
//! Records why a file is in its current status. Catalog entries are looked up
//! (and created on first sight) through a per-attempt cache that is safe for the
//! concurrent writers of the results fan-out. A ledger is created for one
//! ingestion attempt and dropped with it.
//!
//! Within an attempt a code is recorded once per file, whatever its level or
//! the fields it was reported against; the first entry to arrive wins.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::constants::result_codes;
use crate::database::{FileStore, StoreResult};
use crate::models::{CodeLevel, File, NewFileResultCode, ResultCode};
use crate::state_machine::FileStatus;

/// One cause to attach to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    pub code: String,
    pub level: CodeLevel,
    pub description: String,
    pub occurrences: i64,
    pub first_occurrence: Option<i64>,
    pub fields: Vec<String>,
    pub error: Option<String>,
}

impl CodeEntry {
    /// A pipeline failure, described from the internal catalog
    pub fn internal(code: &str, reason: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: CodeLevel::File,
            description: result_codes::description(code).to_string(),
            occurrences: 1,
            first_occurrence: None,
            fields: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

pub struct ResultCodeLedger {
    store: Arc<dyn FileStore>,
    catalog: DashMap<(String, CodeLevel), ResultCode>,
    recorded: DashSet<(i64, String)>,
}

impl ResultCodeLedger {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            catalog: DashMap::new(),
            recorded: DashSet::new(),
        }
    }

    /// Attach `entry` to the file; returns false when this attempt already recorded its code
    pub async fn record(&self, file_id: i64, entry: CodeEntry) -> StoreResult<bool> {
        let dedup_key = (file_id, entry.code.clone());
        if !self.recorded.insert(dedup_key.clone()) {
            debug!(file_id = file_id, code = %entry.code, "Result code already recorded");
            return Ok(false);
        }

        let outcome = async {
            let result_code = self
                .resolve(&entry.code, entry.level, &entry.description)
                .await?;
            self.store
                .add_file_result_code(NewFileResultCode {
                    file_id,
                    result_code_id: result_code.result_code_id,
                    occurrences: entry.occurrences,
                    first_occurrence: entry.first_occurrence,
                    fields: entry.fields,
                    error: entry.error,
                })
                .await
        }
        .await;

        if let Err(e) = outcome {
            self.recorded.remove(&dedup_key);
            return Err(e);
        }
        Ok(true)
    }

    async fn resolve(
        &self,
        code: &str,
        level: CodeLevel,
        description: &str,
    ) -> StoreResult<ResultCode> {
        let key = (code.to_string(), level);
        if let Some(cached) = self.catalog.get(&key) {
            return Ok(cached.clone());
        }

        let result_code = match self.store.find_result_code(code, level).await? {
            Some(existing) => existing,
            None => {
                debug!(code = %code, level = %level, "Creating result code");
                self.store.create_result_code(code, description, level).await?
            }
        };

        self.catalog.insert(key, result_code.clone());
        Ok(result_code)
    }
}

/// Mark a file failed and record the internal cause
///
/// Store failures here are only logged; the caller reports the failure that got here.
pub async fn fail_file(store: &Arc<dyn FileStore>, file: &mut File, code: &str, reason: &str) {
    warn!(
        file_id = file.file_id,
        filename = %file.filename,
        result_code = %code,
        reason = %reason,
        "File failed"
    );

    file.status = FileStatus::Failed;
    if let Err(e) = store.update_file(file).await {
        error!(file_id = file.file_id, error = %e, "Failed to persist failed status");
    }
    tag_file(store, file.file_id, code, reason).await;
}

/// Record an internal cause without touching the file status
pub async fn tag_file(store: &Arc<dyn FileStore>, file_id: i64, code: &str, reason: &str) {
    let ledger = ResultCodeLedger::new(store.clone());
    if let Err(e) = ledger.record(file_id, CodeEntry::internal(code, reason)).await {
        error!(file_id = file_id, result_code = %code, error = %e, "Failed to record result code");
    }
}
