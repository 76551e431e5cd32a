//! # Data Models
//!
//! Domain types shared by the store, the collaborators and the pipeline.
//!
//! - [`file::File`] - an ingested artifact and its processing state
//! - [`template::Template`] - a filename routing rule plus column mapping for one channel
//! - [`partner_folder::PartnerFolder`] - a partner's inbound storage root
//! - [`result_code`] - the catalog of failure causes and the per-file ledger
//! - [`results`] - payloads the workflow engine writes back

pub mod file;
pub mod partner_folder;
pub mod result_code;
pub mod results;
pub mod template;

pub use file::{BackfillWindow, File, FileCounters, FileParameters, NewFile, ParameterError};
pub use partner_folder::PartnerFolder;
pub use result_code::{CodeLevel, FileResultCodeDetail, NewFileResultCode, ResultCode};
pub use results::{
    DeleteResultsError, DeleteResultsPayload, FileError, PatientRecord, ResultRecords,
    ResultsPayload, RowError,
};
pub use template::{FileIdentifier, FileIdentifierType, Template};
