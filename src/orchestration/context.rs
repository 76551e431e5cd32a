use std::sync::Arc;

use crate::clients::{BackfillTrigger, Notifier, ObjectStore, SearchIndex, WorkflowEngine};
use crate::config::IngestConfig;
use crate::database::FileStore;

/// Settings the pipeline reads on every attempt
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub exchange_bucket: String,
    pub max_parallel_backfills: u32,
    pub expiry_threshold: chrono::Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            exchange_bucket: config.exchange.bucket.clone(),
            max_parallel_backfills: config.backfill.max_parallel_backfills,
            expiry_threshold: config.reaper.expiry_threshold(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Collaborators shared by every pipeline component
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn FileStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub workflow: Arc<dyn WorkflowEngine>,
    pub search: Arc<dyn SearchIndex>,
    pub backfill: Arc<dyn BackfillTrigger>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: PipelineSettings,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
