//! Shared test infrastructure: in-memory collaborators, fixtures and
//! proptest strategies, plus a [`Harness`] that wires them into a running
//! [`IngestService`].

#![allow(dead_code)]

pub mod builders;
pub mod fakes;
pub mod strategies;

use std::sync::Arc;

use ingest_core::models::{File, ResultsPayload};
use ingest_core::orchestration::{IntakeOutcome, PipelineContext, PipelineSettings};
use ingest_core::IngestService;

pub use builders::*;
pub use fakes::*;

pub struct Harness {
    pub store: Arc<InMemoryFileStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub workflow: Arc<FakeWorkflowEngine>,
    pub search: Arc<FakeSearchIndex>,
    pub backfill: Arc<FakeBackfillTrigger>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<IngestService>,
}

impl Harness {
    /// One partner with a `members` prefix template and a `_claims` suffix template
    pub fn new() -> Self {
        Self::with_settings(Self::settings())
    }

    pub fn settings() -> PipelineSettings {
        PipelineSettings {
            exchange_bucket: EXCHANGE_BUCKET.to_string(),
            max_parallel_backfills: 1,
            expiry_threshold: chrono::Duration::hours(6),
        }
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let store = Arc::new(InMemoryFileStore::new());
        store.add_folder(partner_folder());
        store.add_emails(PARTNER_FOLDER_ID, &["ops@acme.test"]);
        store.add_template(members_template());
        store.add_template(claims_template());

        let objects = Arc::new(InMemoryObjectStore::new());
        let workflow = Arc::new(FakeWorkflowEngine::new());
        let search = Arc::new(FakeSearchIndex::new());
        let backfill = Arc::new(FakeBackfillTrigger::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let ctx = PipelineContext {
            store: store.clone(),
            objects: objects.clone(),
            workflow: workflow.clone(),
            search: search.clone(),
            backfill: backfill.clone(),
            notifier: notifier.clone(),
            settings,
        };

        Self {
            store,
            objects,
            workflow,
            search,
            backfill,
            notifier,
            service: Arc::new(IngestService::new(ctx)),
        }
    }

    /// Drop `key` into the partner bucket and run intake on it
    pub async fn arrive(&self, key: &str) -> IntakeOutcome {
        self.objects.insert(PARTNER_BUCKET, key, b"FirstName\nAda\n".to_vec());
        let outcome = self
            .service
            .intake()
            .ingest(PARTNER_BUCKET, key)
            .await
            .expect("intake should succeed");
        self.service.wait_for_dispatches().await;
        outcome
    }

    /// Write `payload` as the results object of its run and return the key
    pub fn write_results(&self, payload: &ResultsPayload) -> String {
        let key = format!("results/{}__results.json", payload.flow_run_id);
        self.objects.insert(
            EXCHANGE_BUCKET,
            &key,
            serde_json::to_vec(payload).unwrap(),
        );
        key
    }

    pub fn file(&self, file_id: i64) -> File {
        self.store.file(file_id)
    }

    /// Run id the file was dispatched with
    pub fn run_of(&self, file_id: i64) -> String {
        self.file(file_id)
            .flow_run_id
            .expect("file should have been dispatched")
    }
}
