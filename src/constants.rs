//! # System Constants
//!
//! Result codes, exchange folder names and object naming conventions shared by
//! every stage of the ingestion pipeline.

/// Internal result codes recorded against a file when a pipeline stage fails.
///
/// These are partner visible, so the codes are stable and never reused.
pub mod result_codes {
    pub const TEMPLATE_NOT_FOUND: &str = "Int-01";
    pub const WORKFLOW_BUILD_FAILED: &str = "Int-02";
    pub const WORKFLOW_CALL_FAILED: &str = "Int-03";
    pub const INDEX_ADD_FAILED: &str = "Int-04";
    pub const INDEX_DELETE_FAILED: &str = "Int-05";
    pub const EXCHANGE_MOVE_FAILED: &str = "Int-07";
    pub const RESULTS_INVALID: &str = "Int-08";
    pub const GATE_CHECK_FAILED: &str = "Int-09";
    pub const EXCHANGE_COPY_FAILED: &str = "Int-10";
    pub const WORKFLOW_TIMEOUT: &str = "Int-11";
    pub const RESULTS_DOWNLOAD_FAILED: &str = "Int-12";
    pub const RESULTS_DECODE_FAILED: &str = "Int-13";
    pub const EXPIRED: &str = "Int-14";
    pub const BACKFILL_START_FAILED: &str = "Int-15";

    /// Catch-all code the workflow engine emits for errors it did not classify
    pub const UNCAUGHT: &str = "err-99";

    /// Catalog description used when an internal code is first created in the store
    pub fn description(code: &str) -> &'static str {
        match code {
            TEMPLATE_NOT_FOUND => "No active template matches the file",
            WORKFLOW_BUILD_FAILED => "Could not build the workflow request",
            WORKFLOW_CALL_FAILED => "Workflow engine rejected the request",
            INDEX_ADD_FAILED => "Could not add records to the search index",
            INDEX_DELETE_FAILED => "Could not delete records from the search index",
            EXCHANGE_MOVE_FAILED => "Could not move the file out of the load area",
            RESULTS_INVALID => "Workflow results failed validation",
            GATE_CHECK_FAILED => "Could not check for other files in processing",
            EXCHANGE_COPY_FAILED => "Could not copy the file into the exchange bucket",
            WORKFLOW_TIMEOUT => "Workflow engine request timed out",
            RESULTS_DOWNLOAD_FAILED => "Could not download workflow results",
            RESULTS_DECODE_FAILED => "Could not decode workflow results",
            EXPIRED => "File expired while waiting for workflow results",
            BACKFILL_START_FAILED => "Could not start the backfill",
            _ => "Unclassified error",
        }
    }

    pub fn is_uncaught(code: &str) -> bool {
        code.eq_ignore_ascii_case(UNCAUGHT)
    }
}

/// Top-level folders of the exchange bucket
pub mod folders {
    pub const LOAD: &str = "load";
    pub const PROCESSED: &str = "processed";
    pub const FAILED: &str = "failed";
}

/// Suffix of a standard (or refresh) results object
pub const RESULTS_SUFFIX: &str = "__results.json";

/// Suffix of a partner deactivation results object
pub const DELETE_RESULTS_SUFFIX: &str = "__delete_results.json";

/// Status string the workflow engine reports for a clean run
pub const RESULTS_STATUS_SUCCESS: &str = "success";

/// Status string the workflow engine reports for a rejected file
pub const RESULTS_STATUS_INVALID: &str = "invalid";

/// Status string that disqualifies a refresh payload
pub const RESULTS_STATUS_ERROR: &str = "error";

/// Maximum number of errors rendered into a notification email
pub const MAX_NOTIFICATION_ERRORS: usize = 10;
