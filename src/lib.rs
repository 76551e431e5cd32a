#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Ingest Core
//!
//! Orchestration core for partner-uploaded data files.
//!
//! ## Overview
//!
//! Partners drop files into their storage folders. Each arriving file is routed to a
//! matching template, staged into a shared exchange bucket and handed to an external
//! workflow engine. The engine reports back asynchronously with a results object that
//! is absorbed into the search index, the result-code ledger and partner notifications.
//!
//! ## Pipeline
//!
//! ```text
//! bucket event -> SourceFileIntake -> TemplateMatcher -> exchange staging
//!              -> ConcurrencyGate -> DispatchExecutor -> WorkflowDispatcher
//! results object -> ResultsIngestor -> {search index, result codes, notification, gate drain}
//! ```
//!
//! ## Key Features
//!
//! - **Deterministic template routing**: prefix beats suffix beats the unspecified default
//! - **Per-channel single flight**: derived from persisted file rows on every check, so it
//!   holds across service replicas
//! - **Detached dispatch**: workflow submission runs on its own executor and is never
//!   cancelled by the request that triggered it
//! - **Partner-visible failures**: every failure that reaches a file is persisted as a result code
//! - **Backfills**: bounded historical reprocessing with a global and a per-channel limit
//!
//! ## Module Organization
//!
//! - [`models`] - Files, templates, partner folders, result codes and result payloads
//! - [`database`] - The `FileStore` contract and its PostgreSQL implementation
//! - [`clients`] - Object store, workflow engine, search index, backfill and mail collaborators
//! - [`orchestration`] - The ingestion pipeline itself
//! - [`state_machine`] - File status definitions
//! - [`config`] - Environment-aware YAML configuration
//! - [`web`] - Webhook surface for bucket events
//! - [`error`] - Crate-level error handling

pub mod clients;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod web;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use orchestration::service::IngestService;
pub use state_machine::FileStatus;
