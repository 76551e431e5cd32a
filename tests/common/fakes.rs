//! In-memory collaborators for driving the pipeline without PostgreSQL or HTTP.
//!
//! Each fake records what it was asked to do and can be told to fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use ingest_core::clients::{
    BackfillError, BackfillTrigger, BulkStats, DeletedReport, ExchangeLocation, IndexKey,
    Notifier, NotifierError, ObjectStore, ObjectStoreError, ProcessingReport, SearchIndex,
    SearchIndexError, WorkflowEngine, WorkflowError,
};
use ingest_core::database::{FileStore, StoreError, StoreResult};
use ingest_core::models::{
    BackfillWindow, CodeLevel, File, FileCounters, FileResultCodeDetail, NewFile,
    NewFileResultCode, PartnerFolder, PatientRecord, ResultCode, Template,
};
use ingest_core::FileStatus;

#[derive(Default)]
struct StoreState {
    folders: BTreeMap<i64, PartnerFolder>,
    emails: HashMap<i64, Vec<String>>,
    files: BTreeMap<i64, File>,
    templates: BTreeMap<i64, Template>,
    result_codes: Vec<ResultCode>,
    ledger: Vec<NewFileResultCode>,
    next_file_id: i64,
}

impl StoreState {
    fn channel_of(&self, file: &File) -> Option<i64> {
        file.template_id
            .and_then(|id| self.templates.get(&id))
            .map(|template| template.channel_id)
    }
}

/// `FileStore` over maps guarded by a mutex
#[derive(Default)]
pub struct InMemoryFileStore {
    state: Mutex<StoreState>,
    fail_gate_lookups: AtomicBool,
    reject_failed_status: AtomicBool,
    rejected_updates: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, folder: PartnerFolder) {
        self.state
            .lock()
            .unwrap()
            .folders
            .insert(folder.partner_folder_id, folder);
    }

    pub fn add_emails(&self, partner_folder_id: i64, emails: &[&str]) {
        self.state.lock().unwrap().emails.insert(
            partner_folder_id,
            emails.iter().map(|e| e.to_string()).collect(),
        );
    }

    pub fn add_template(&self, template: Template) {
        self.state
            .lock()
            .unwrap()
            .templates
            .insert(template.template_id, template);
    }

    pub fn deactivate_template(&self, template_id: i64) {
        if let Some(template) = self.state.lock().unwrap().templates.get_mut(&template_id) {
            template.is_active = false;
        }
    }

    /// Make the processing-file lookup fail, as a lost connection would
    pub fn fail_gate_lookups(&self, fail: bool) {
        self.fail_gate_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make `update_file` fail for rows being moved to `failed`
    pub fn reject_failed_status(&self, reject: bool) {
        self.reject_failed_status.store(reject, Ordering::SeqCst);
    }

    /// Updates refused by [`Self::reject_failed_status`]
    pub fn rejected_updates(&self) -> usize {
        self.rejected_updates.load(Ordering::SeqCst)
    }

    /// Make `ping` fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Pretend a file has not been touched for `age`
    pub fn backdate(&self, file_id: i64, age: chrono::Duration) {
        if let Some(file) = self.state.lock().unwrap().files.get_mut(&file_id) {
            file.updated_at = Utc::now() - age;
        }
    }

    pub fn file(&self, file_id: i64) -> File {
        self.state.lock().unwrap().files[&file_id].clone()
    }

    pub fn files(&self) -> Vec<File> {
        self.state.lock().unwrap().files.values().cloned().collect()
    }

    pub fn folder(&self, partner_folder_id: i64) -> PartnerFolder {
        self.state.lock().unwrap().folders[&partner_folder_id].clone()
    }

    pub fn templates(&self) -> Vec<Template> {
        self.state.lock().unwrap().templates.values().cloned().collect()
    }

    /// Codes recorded against a file, in recording order
    pub fn codes_for(&self, file_id: i64) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .ledger
            .iter()
            .filter(|entry| entry.file_id == file_id)
            .filter_map(|entry| {
                state
                    .result_codes
                    .iter()
                    .find(|code| code.result_code_id == entry.result_code_id)
                    .map(|code| code.code.clone())
            })
            .collect()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn ping(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection refused".to_string()));
        }
        Ok(())
    }

    async fn find_partner_folder(&self, partner_folder_id: i64) -> StoreResult<PartnerFolder> {
        self.state
            .lock()
            .unwrap()
            .folders
            .get(&partner_folder_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("partner folder", partner_folder_id))
    }

    async fn find_partner_folder_by_bucket(&self, bucket_name: &str) -> StoreResult<PartnerFolder> {
        self.state
            .lock()
            .unwrap()
            .folders
            .values()
            .find(|folder| folder.bucket_name == bucket_name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("partner folder", bucket_name))
    }

    async fn set_partner_folder_deactivated(
        &self,
        partner_folder_id: i64,
        deactivated: bool,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let folder = state
            .folders
            .get_mut(&partner_folder_id)
            .ok_or_else(|| StoreError::not_found("partner folder", partner_folder_id))?;
        folder.deactivated_at = deactivated.then(Utc::now);
        Ok(())
    }

    async fn partner_emails(&self, partner_folder_id: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .emails
            .get(&partner_folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_file(&self, new_file: NewFile) -> StoreResult<File> {
        let mut state = self.state.lock().unwrap();
        state.next_file_id += 1;
        let now = Utc::now();
        let file = File {
            file_id: state.next_file_id,
            filename: new_file.filename,
            partner_folder_id: new_file.partner_folder_id,
            object_key: new_file.object_key,
            status: new_file.status,
            template_id: new_file.template_id,
            is_backfill: new_file.is_backfill,
            file_parameters: new_file.file_parameters,
            flow_run_id: None,
            counters: FileCounters::default(),
            created_at: now,
            updated_at: now,
            processed_at: None,
        };
        state.files.insert(file.file_id, file.clone());
        Ok(file)
    }

    async fn update_file(&self, file: &File) -> StoreResult<()> {
        if file.status == FileStatus::Failed && self.reject_failed_status.load(Ordering::SeqCst) {
            self.rejected_updates.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Database("deadlock detected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let stored = state
            .files
            .get_mut(&file.file_id)
            .ok_or_else(|| StoreError::not_found("file", file.file_id))?;
        *stored = File {
            updated_at: Utc::now(),
            ..file.clone()
        };
        Ok(())
    }

    async fn delete_file(&self, file_id: i64) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.files.remove(&file_id);
        state.ledger.retain(|entry| entry.file_id != file_id);
        Ok(())
    }

    async fn find_file(&self, file_id: i64) -> StoreResult<File> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("file", file_id))
    }

    async fn find_file_by_flow_run_id(&self, flow_run_id: &str) -> StoreResult<File> {
        self.state
            .lock()
            .unwrap()
            .files
            .values()
            .find(|file| file.flow_run_id.as_deref() == Some(flow_run_id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("file", flow_run_id))
    }

    async fn find_file_by_key(
        &self,
        partner_folder_id: i64,
        object_key: &str,
        status: FileStatus,
    ) -> StoreResult<Option<File>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .values()
            .find(|file| {
                file.partner_folder_id == partner_folder_id
                    && file.object_key == object_key
                    && file.status == status
            })
            .cloned())
    }

    async fn find_processing_file_for_channel(
        &self,
        channel_id: i64,
        is_backfill: bool,
    ) -> StoreResult<Option<File>> {
        if self.fail_gate_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .values()
            .find(|file| {
                file.status == FileStatus::Processing
                    && file.is_backfill == is_backfill
                    && state.channel_of(file) == Some(channel_id)
            })
            .cloned())
    }

    async fn find_oldest_waiting_file_for_channel(
        &self,
        channel_id: i64,
    ) -> StoreResult<Option<File>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .values()
            .filter(|file| {
                file.status == FileStatus::Waiting && state.channel_of(file) == Some(channel_id)
            })
            .min_by_key(|file| (file.created_at, file.file_id))
            .cloned())
    }

    async fn count_processing_backfills(&self) -> StoreResult<i64> {
        let count = self
            .state
            .lock()
            .unwrap()
            .files
            .values()
            .filter(|file| file.is_backfill && file.status == FileStatus::Processing)
            .count();
        Ok(count as i64)
    }

    async fn find_files_for_channel(
        &self,
        channel_id: i64,
        partner_folder_id: i64,
    ) -> StoreResult<Vec<File>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .values()
            .filter(|file| {
                file.partner_folder_id == partner_folder_id
                    && state.channel_of(file) == Some(channel_id)
            })
            .cloned()
            .collect())
    }

    async fn find_expired_files(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<File>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .values()
            .filter(|file| {
                !file.is_backfill && file.status.is_transient() && file.updated_at < older_than
            })
            .cloned()
            .collect())
    }

    async fn find_template(&self, template_id: i64) -> StoreResult<Template> {
        self.state
            .lock()
            .unwrap()
            .templates
            .get(&template_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", template_id))
    }

    async fn active_templates_for_folder(
        &self,
        partner_folder_id: i64,
    ) -> StoreResult<Vec<Template>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .templates
            .values()
            .filter(|t| t.partner_folder_id == partner_folder_id && t.is_active)
            .cloned()
            .collect())
    }

    async fn delete_templates_for_channel(&self, channel_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.templates.len();
        state.templates.retain(|_, t| t.channel_id != channel_id);
        Ok((before - state.templates.len()) as u64)
    }

    async fn find_result_code(
        &self,
        code: &str,
        level: CodeLevel,
    ) -> StoreResult<Option<ResultCode>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .result_codes
            .iter()
            .find(|rc| rc.code == code && rc.level == level)
            .cloned())
    }

    async fn create_result_code(
        &self,
        code: &str,
        description: &str,
        level: CodeLevel,
    ) -> StoreResult<ResultCode> {
        let mut state = self.state.lock().unwrap();
        let result_code = ResultCode {
            result_code_id: state.result_codes.len() as i64 + 1,
            code: code.to_string(),
            description: description.to_string(),
            level,
        };
        state.result_codes.push(result_code.clone());
        Ok(result_code)
    }

    async fn add_file_result_code(&self, entry: NewFileResultCode) -> StoreResult<()> {
        self.state.lock().unwrap().ledger.push(entry);
        Ok(())
    }

    async fn file_result_codes(&self, file_id: i64) -> StoreResult<Vec<FileResultCodeDetail>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ledger
            .iter()
            .filter(|entry| entry.file_id == file_id)
            .filter_map(|entry| {
                let code = state
                    .result_codes
                    .iter()
                    .find(|rc| rc.result_code_id == entry.result_code_id)?;
                Some(FileResultCodeDetail {
                    code: code.code.clone(),
                    description: code.description.clone(),
                    level: code.level,
                    occurrences: entry.occurrences,
                    first_occurrence: entry.first_occurrence,
                    fields: entry.fields.clone(),
                    error: entry.error.clone(),
                })
            })
            .collect())
    }
}

/// `ObjectStore` over a map of `(bucket, key)` to body
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    fail_copies: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Keys of a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn fail_copies(&self, fail: bool) {
        self.fail_copies.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<(), ObjectStoreError> {
        if self.fail_copies.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Io("copy refused".to_string()));
        }
        let body = self.get(source_bucket, source_key).await?;
        self.insert(destination_bucket, destination_key, body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFailure {
    Timeout,
    Rejected,
}

/// Workflow engine that hands out `run-<n>` ids
///
/// Built requests are plain JSON so tests can inspect what was submitted.
#[derive(Default)]
pub struct FakeWorkflowEngine {
    submitted: Mutex<Vec<serde_json::Value>>,
    runs: AtomicUsize,
    fail_builds: AtomicBool,
    submit_failure: Mutex<Option<SubmitFailure>>,
}

impl FakeWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_builds(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, failure: Option<SubmitFailure>) {
        *self.submit_failure.lock().unwrap() = failure;
    }

    pub fn submitted(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().unwrap().clone()
    }

    fn encode(request: serde_json::Value) -> Result<Vec<u8>, WorkflowError> {
        serde_json::to_vec(&request).map_err(|e| WorkflowError::Build(e.to_string()))
    }
}

#[async_trait]
impl WorkflowEngine for FakeWorkflowEngine {
    fn build_process_request(
        &self,
        template: &Template,
        file: &File,
        exchange: &ExchangeLocation,
    ) -> Result<Vec<u8>, WorkflowError> {
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(WorkflowError::Build("column mapping rejected".to_string()));
        }
        Self::encode(serde_json::json!({
            "kind": "process",
            "file_id": file.file_id,
            "channel_id": template.channel_id,
            "input": exchange.uri(),
            "only_validate": file.is_backfill,
        }))
    }

    fn build_sync_request(&self, channel_id: i64) -> Result<Vec<u8>, WorkflowError> {
        Self::encode(serde_json::json!({"kind": "sync", "channel_id": channel_id}))
    }

    fn build_deactivate_request(
        &self,
        partner_folder_id: i64,
        channel_ids: &[i64],
    ) -> Result<Vec<u8>, WorkflowError> {
        Self::encode(serde_json::json!({
            "kind": "deactivate",
            "partner_folder_id": partner_folder_id,
            "channel_ids": channel_ids,
        }))
    }

    async fn submit(&self, request: Vec<u8>) -> Result<String, WorkflowError> {
        match *self.submit_failure.lock().unwrap() {
            Some(SubmitFailure::Timeout) => {
                return Err(WorkflowError::Timeout("deadline elapsed".to_string()))
            }
            Some(SubmitFailure::Rejected) => {
                return Err(WorkflowError::Rejected("version group archived".to_string()))
            }
            None => {}
        }

        let request: serde_json::Value =
            serde_json::from_slice(&request).map_err(|e| WorkflowError::Request(e.to_string()))?;
        self.submitted.lock().unwrap().push(request);
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("run-{run}"))
    }
}

/// Search index keeping documents per index, keyed by patient hash
#[derive(Default)]
pub struct FakeSearchIndex {
    documents: Mutex<HashMap<IndexKey, BTreeMap<String, PatientRecord>>>,
    fail_upserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FakeSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, index: IndexKey, records: Vec<PatientRecord>) {
        let mut documents = self.documents.lock().unwrap();
        let entries = documents.entry(index).or_default();
        for record in records {
            entries.insert(record.patient_hash.clone(), record);
        }
    }

    /// Patient hashes of one channel, sorted
    pub fn hashes(&self, index: IndexKey, channel_id: i64) -> Vec<String> {
        self.documents
            .lock()
            .unwrap()
            .get(&index)
            .map(|entries| {
                entries
                    .values()
                    .filter(|r| r.channel_item_id == channel_id)
                    .map(|r| r.patient_hash.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchIndex for FakeSearchIndex {
    async fn delete_by_channel(
        &self,
        index: IndexKey,
        channel_id: i64,
    ) -> Result<u64, SearchIndexError> {
        let mut documents = self.documents.lock().unwrap();
        let entries = documents.entry(index).or_default();
        let before = entries.len();
        entries.retain(|_, r| r.channel_item_id != channel_id);
        Ok((before - entries.len()) as u64)
    }

    async fn bulk_upsert(
        &self,
        index: IndexKey,
        records: &[PatientRecord],
        _flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(SearchIndexError::Response {
                status: 503,
                message: "cluster unavailable".to_string(),
            });
        }
        self.seed(index, records.to_vec());
        Ok(BulkStats {
            succeeded: records.len(),
            failed: 0,
        })
    }

    async fn bulk_delete(
        &self,
        index: IndexKey,
        patient_hashes: &[String],
        _flow_run_id: &str,
    ) -> Result<BulkStats, SearchIndexError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SearchIndexError::Request("connection reset".to_string()));
        }
        let mut documents = self.documents.lock().unwrap();
        let entries = documents.entry(index).or_default();
        let mut stats = BulkStats::default();
        for hash in patient_hashes {
            if entries.remove(hash).is_some() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }
        Ok(stats)
    }

    async fn count_by_channel(
        &self,
        index: IndexKey,
        channel_id: i64,
    ) -> Result<u64, SearchIndexError> {
        Ok(self.hashes(index, channel_id).len() as u64)
    }
}

#[derive(Default)]
pub struct FakeBackfillTrigger {
    started: Mutex<Vec<(i64, BackfillWindow)>>,
    fail: AtomicBool,
}

impl FakeBackfillTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(i64, BackfillWindow)> {
        self.started.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackfillTrigger for FakeBackfillTrigger {
    async fn start(&self, channel_id: i64, window: BackfillWindow) -> Result<(), BackfillError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackfillError::Response {
                status: 500,
                message: "backfill service down".to_string(),
            });
        }
        self.started.lock().unwrap().push((channel_id, window));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    processing: Mutex<Vec<ProcessingReport>>,
    deleted: Mutex<Vec<DeletedReport>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processing_reports(&self) -> Vec<ProcessingReport> {
        self.processing.lock().unwrap().clone()
    }

    pub fn deleted_reports(&self) -> Vec<DeletedReport> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_processing_report(&self, report: &ProcessingReport) -> Result<(), NotifierError> {
        self.processing.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn send_deleted_report(&self, report: &DeletedReport) -> Result<(), NotifierError> {
        self.deleted.lock().unwrap().push(report.clone());
        Ok(())
    }
}
