//! # Ingest Service
//!
//! Wires the pipeline components around one [`PipelineContext`] and owns the
//! dispatch executor. Construct it inside a Tokio runtime.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use super::backfill_closeout::BackfillCloseout;
use super::concurrency_gate::ConcurrencyGate;
use super::context::{PipelineContext, PipelineSettings};
use super::expiry_reaper::ExpiryReaper;
use super::partner_admin::PartnerAdmin;
use super::results::ResultsIngestor;
use super::source_file_intake::SourceFileIntake;
use super::upload::FileUploadService;
use super::workflow_dispatcher::{dispatch_channel, DispatchExecutor, DispatchHandle, WorkflowDispatcher};
use crate::clients::{
    GraphqlWorkflowEngine, HttpBackfillTrigger, HttpNotifier, HttpSearchIndex, LocalObjectStore,
};
use crate::config::{ConfigurationError, IngestConfig};
use crate::database::{DatabaseConnection, PgFileStore};
use crate::error::Result;

pub struct IngestService {
    ctx: PipelineContext,
    gate: Arc<ConcurrencyGate>,
    dispatch: DispatchHandle,
    intake: SourceFileIntake,
    results: ResultsIngestor,
    upload: FileUploadService,
    closeout: BackfillCloseout,
    admin: PartnerAdmin,
    reaper: Arc<ExpiryReaper>,
    executor: JoinHandle<()>,
}

impl IngestService {
    pub fn new(ctx: PipelineContext) -> Self {
        let (dispatch, queue) = dispatch_channel();
        let gate = Arc::new(ConcurrencyGate::new(ctx.clone(), dispatch.clone()));
        let dispatcher = Arc::new(WorkflowDispatcher::new(ctx.clone()));
        let executor = DispatchExecutor::new(dispatcher, gate.clone()).spawn(queue);

        Self {
            intake: SourceFileIntake::new(ctx.clone(), gate.clone(), dispatch.clone()),
            results: ResultsIngestor::new(ctx.clone(), gate.clone()),
            upload: FileUploadService::new(ctx.clone(), gate.clone()),
            closeout: BackfillCloseout::new(ctx.clone()),
            admin: PartnerAdmin::new(ctx.clone()),
            reaper: Arc::new(ExpiryReaper::new(ctx.clone(), gate.clone())),
            ctx,
            gate,
            dispatch,
            executor,
        }
    }

    /// Connect to the database and the HTTP collaborators named in `config`
    pub async fn from_config(config: &IngestConfig) -> Result<Self> {
        config.validate()?;

        let url = config.database_url().ok_or_else(|| {
            ConfigurationError::missing_required_field("database.url", "set it or export DATABASE_URL")
        })?;
        let connection = DatabaseConnection::connect(&url, &config.database).await?;
        let ctx = PipelineContext {
            store: Arc::new(PgFileStore::new(connection.pool().clone())),
            objects: Arc::new(LocalObjectStore::new(config.object_store.root.clone())),
            workflow: Arc::new(GraphqlWorkflowEngine::new(config.workflow.clone())?),
            search: Arc::new(HttpSearchIndex::new(config.search.clone())?),
            backfill: Arc::new(HttpBackfillTrigger::new(config.backfill.clone())?),
            notifier: Arc::new(HttpNotifier::new(config.mail.clone())?),
            settings: PipelineSettings::from_config(config),
        };

        info!(
            environment = %config.environment,
            exchange_bucket = %ctx.settings.exchange_bucket,
            max_parallel_backfills = ctx.settings.max_parallel_backfills,
            "🔧 Ingest service initialized"
        );
        Ok(Self::new(ctx))
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn intake(&self) -> &SourceFileIntake {
        &self.intake
    }

    pub fn results(&self) -> &ResultsIngestor {
        &self.results
    }

    pub fn upload(&self) -> &FileUploadService {
        &self.upload
    }

    pub fn closeout(&self) -> &BackfillCloseout {
        &self.closeout
    }

    pub fn admin(&self) -> &PartnerAdmin {
        &self.admin
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn reaper(&self) -> Arc<ExpiryReaper> {
        self.reaper.clone()
    }

    pub fn dispatch(&self) -> &DispatchHandle {
        &self.dispatch
    }

    /// Wait for every queued workflow submission to finish
    pub async fn wait_for_dispatches(&self) {
        self.dispatch.wait_idle().await;
    }
}

impl Drop for IngestService {
    fn drop(&mut self) {
        self.executor.abort();
    }
}
