// File status definitions for the ingestion pipeline.
//
// Status lives on the persisted file row; every stage re-reads it rather than
// holding an in-memory machine, so transitions are plain assignments.

pub mod states;

pub use states::FileStatus;
