//! # Workflow Dispatcher
//!
//! Hands a staged file to the workflow engine and records the run id that the
//! engine will echo back in its results.
//!
//! Submissions never run on the caller's task. [`DispatchHandle::submit`] only
//! enqueues a job; the executor loop started by [`DispatchExecutor::spawn`]
//! picks it up and runs the submission on its own task, so an intake request
//! that is cancelled or times out does not take the submission down with it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::concurrency_gate::ConcurrencyGate;
use super::context::PipelineContext;
use super::errors::DispatchError;
use super::exchange::Exchange;
use super::notification::{Population, ReportSender, ReportStage};
use super::result_codes::fail_file;
use crate::constants::result_codes;
use crate::models::{File, Template};
use crate::state_machine::FileStatus;

pub struct WorkflowDispatcher {
    ctx: PipelineContext,
    exchange: Exchange,
}

impl WorkflowDispatcher {
    pub fn new(ctx: PipelineContext) -> Self {
        let exchange = Exchange::new(ctx.clone());
        Self { ctx, exchange }
    }

    /// Build and submit the processing run for `file`
    ///
    /// On success the file is `processing` and carries the run id. On failure
    /// it is `failed` with the matching result code.
    #[instrument(skip_all, fields(file_id = file.file_id, template_id = template.template_id))]
    pub async fn dispatch(&self, mut file: File, template: &Template) -> Result<String, DispatchError> {
        let location = self.exchange.location(&file);

        let request = match self
            .ctx
            .workflow
            .build_process_request(template, &file, &location)
        {
            Ok(request) => request,
            Err(e) => {
                fail_file(
                    &self.ctx.store,
                    &mut file,
                    result_codes::WORKFLOW_BUILD_FAILED,
                    &e.to_string(),
                )
                .await;
                return Err(DispatchError::Build {
                    file_id: file.file_id,
                    source: e,
                });
            }
        };

        let flow_run_id = match self.ctx.workflow.submit(request).await {
            Ok(id) => id,
            Err(e) => {
                let code = if e.is_timeout() {
                    result_codes::WORKFLOW_TIMEOUT
                } else {
                    result_codes::WORKFLOW_CALL_FAILED
                };
                fail_file(&self.ctx.store, &mut file, code, &e.to_string()).await;
                return Err(DispatchError::Submit {
                    file_id: file.file_id,
                    source: e,
                });
            }
        };

        file.flow_run_id = Some(flow_run_id.clone());
        file.status = FileStatus::Processing;
        self.ctx.store.update_file(&file).await?;

        info!(
            correlation_id = %flow_run_id,
            channel_id = template.channel_id,
            input = %location.uri(),
            "File submitted to workflow engine"
        );
        Ok(flow_run_id)
    }
}

struct DispatchJob {
    file: File,
    template: Template,
}

#[derive(Debug)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Sending side of the dispatch queue
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::UnboundedSender<DispatchJob>,
    in_flight: Arc<InFlight>,
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Receiving side of the dispatch queue, consumed by [`DispatchExecutor::spawn`]
pub struct DispatchQueue {
    receiver: mpsc::UnboundedReceiver<DispatchJob>,
    in_flight: Arc<InFlight>,
}

/// Create a connected handle/queue pair
///
/// The pair is created before the executor so that the concurrency gate, which
/// both feeds and is called by the executor, can hold the handle.
///
/// ```
/// # tokio_test::block_on(async {
/// use ingest_core::orchestration::workflow_dispatcher::dispatch_channel;
///
/// let (handle, _queue) = dispatch_channel();
/// assert_eq!(handle.in_flight(), 0);
/// handle.wait_idle().await;
/// # });
/// ```
pub fn dispatch_channel() -> (DispatchHandle, DispatchQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let in_flight = Arc::new(InFlight {
        count: AtomicUsize::new(0),
        idle: Notify::new(),
    });
    (
        DispatchHandle {
            sender,
            in_flight: in_flight.clone(),
        },
        DispatchQueue {
            receiver,
            in_flight,
        },
    )
}

impl DispatchHandle {
    /// Queue `file` for submission; returns the file back if the executor is gone
    pub fn submit(&self, file: File, template: Template) -> Result<(), File> {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        match self.sender.send(DispatchJob { file, template }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(job)) => {
                self.in_flight.finish();
                Err(job.file)
            }
        }
    }

    /// Jobs queued or running, including any a running job queued behind it
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until no submission is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Executor loop that runs each queued submission on its own task
pub struct DispatchExecutor {
    dispatcher: Arc<WorkflowDispatcher>,
    gate: Arc<ConcurrencyGate>,
    reports: ReportSender,
}

impl DispatchExecutor {
    pub fn new(dispatcher: Arc<WorkflowDispatcher>, gate: Arc<ConcurrencyGate>) -> Self {
        let reports = ReportSender::new(dispatcher.ctx.clone());
        Self {
            dispatcher,
            gate,
            reports,
        }
    }

    /// Start consuming `queue`
    ///
    /// The gate keeps a handle for as long as the executor holds the gate, so
    /// the queue never closes on its own. Stop the loop by aborting the returned
    /// task, as `IngestService` does when it is dropped.
    pub fn spawn(self, mut queue: DispatchQueue) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("Dispatch executor started");
            while let Some(job) = queue.receiver.recv().await {
                let dispatcher = self.dispatcher.clone();
                let gate = self.gate.clone();
                let reports = self.reports.clone();
                let in_flight = queue.in_flight.clone();

                tokio::spawn(async move {
                    run_job(&dispatcher, &gate, &reports, job).await;
                    in_flight.finish();
                });
            }
            debug!("Dispatch executor stopped");
        })
    }
}

async fn run_job(
    dispatcher: &WorkflowDispatcher,
    gate: &ConcurrencyGate,
    reports: &ReportSender,
    job: DispatchJob,
) {
    let DispatchJob { file, template } = job;
    let file_id = file.file_id;
    let is_backfill = file.is_backfill;

    match dispatcher.dispatch(file, &template).await {
        Ok(_) => {}
        Err(DispatchError::Store(e)) => {
            // The engine accepted the run; its results will still find nothing to correlate with
            error!(file_id = file_id, error = %e, "Failed to record workflow submission");
        }
        Err(e) => {
            warn!(file_id = file_id, error = %e, "Dispatch failed");
            reports
                .send_processing_report(file_id, ReportStage::PreProcess, Population::default())
                .await;
            if !is_backfill {
                gate.drain(&template).await;
            }
        }
    }
}
