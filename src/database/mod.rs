//! # Database Operations
//!
//! Persistence for files, templates, partner folders and the result-code ledger.
//!
//! ## Key Components
//!
//! - [`file_store`] - The [`FileStore`] contract the pipeline is written against
//! - [`postgres`] - [`PgFileStore`], the SQLx/PostgreSQL implementation
//! - [`connection`] - Pool construction and health checks
//! - [`migrations`] - Embedded schema migrations
//!
//! The concurrency gate is derived from these rows on every check, so the queries
//! behind `find_processing_file_for_channel` and `find_oldest_waiting_file_for_channel`
//! are part of the correctness story, not just lookups.

pub mod connection;
pub mod file_store;
pub mod migrations;
pub mod postgres;

pub use connection::DatabaseConnection;
pub use file_store::{FileStore, StoreError, StoreResult};
pub use migrations::DatabaseMigrations;
pub use postgres::PgFileStore;
