//! # External Collaborators
//!
//! Each collaborator is a trait the pipeline is written against plus the
//! implementation the service wires in at startup.
//!
//! - [`object_store`] - bucket/key object storage ([`LocalObjectStore`])
//! - [`workflow`] - the external workflow engine ([`GraphqlWorkflowEngine`])
//! - [`search_index`] - patient search population ([`HttpSearchIndex`])
//! - [`backfill`] - backfill starter ([`HttpBackfillTrigger`])
//! - [`notifier`] - partner email reports ([`HttpNotifier`])

pub mod backfill;
pub mod notifier;
pub mod object_store;
pub mod search_index;
pub mod workflow;

pub use backfill::{BackfillError, BackfillTrigger, HttpBackfillTrigger};
pub use notifier::{DeletedReport, HttpNotifier, Notifier, NotifierError, ProcessingReport};
pub use object_store::{LocalObjectStore, ObjectStore, ObjectStoreError};
pub use search_index::{BulkStats, HttpSearchIndex, IndexKey, SearchIndex, SearchIndexError};
pub use workflow::{ExchangeLocation, GraphqlWorkflowEngine, WorkflowEngine, WorkflowError};

use std::time::Duration;

/// Shared reqwest client construction for the HTTP collaborators
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ingest-core-rs/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Body of a failed response, for error messages
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}
