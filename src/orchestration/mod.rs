//! # Ingestion Pipeline
//!
//! Everything between "a file landed in a partner bucket" and "the partner got
//! their report".
//!
//! ## Components
//!
//! - [`template_matcher`]: routes a filename to one of the partner's templates
//! - [`concurrency_gate`]: one processing file per channel, waiting-file drain,
//!   backfill admission
//! - [`source_file_intake`]: registers, routes and stages arriving files
//! - [`workflow_dispatcher`]: submits staged files to the workflow engine on a
//!   detached executor
//! - [`results`]: absorbs the engine's results objects
//! - [`expiry_reaper`]: fails files that stopped making progress
//! - [`upload`], [`backfill_closeout`], [`partner_admin`]: operator entry points
//!
//! Every component works against the collaborator traits bundled in
//! [`context::PipelineContext`], and [`service::IngestService`] wires them
//! together.

pub mod backfill_closeout;
pub mod concurrency_gate;
pub mod context;
pub mod errors;
pub mod exchange;
pub mod expiry_reaper;
pub mod notification;
pub mod partner_admin;
pub mod result_codes;
pub mod results;
pub mod service;
pub mod source_file_intake;
pub mod template_matcher;
pub mod upload;
pub mod workflow_dispatcher;

pub use backfill_closeout::BackfillCloseout;
pub use concurrency_gate::{ConcurrencyGate, GateDecision};
pub use context::{PipelineContext, PipelineSettings};
pub use errors::{
    AdminError, BackfillAdmissionError, DispatchError, IntakeError, MatchError, ResultsError,
    UploadError,
};
pub use expiry_reaper::{ExpiryReaper, SweepReport};
pub use partner_admin::{AdminRun, PartnerAdmin};
pub use results::{ResultsIngestor, ResultsObject, ResultsOutcome};
pub use service::IngestService;
pub use source_file_intake::{IntakeOutcome, SourceFileIntake};
pub use template_matcher::{select_template, TemplateMatcher};
pub use upload::{FileUploadService, UploadRequest};
pub use workflow_dispatcher::{DispatchExecutor, DispatchHandle, WorkflowDispatcher};
