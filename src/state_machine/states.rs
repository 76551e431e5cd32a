use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{folders, RESULTS_STATUS_INVALID, RESULTS_STATUS_SUCCESS};

/// Lifecycle status of an ingested file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Registered by an upload, waiting for its bucket event
    New,
    /// Bucket event received, routing and staging in progress
    Preprocess,
    /// Held back because another file of the same channel is processing
    Waiting,
    /// Submitted to the workflow engine, results outstanding
    Processing,
    /// Results absorbed successfully
    Processed,
    /// The workflow engine rejected the file contents
    Invalid,
    /// A pipeline stage failed
    Failed,
}

impl FileStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid | Self::Failed)
    }

    /// Transient states are the ones the expiry sweep watches
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Preprocess | Self::Processing)
    }

    /// Map the status string reported by the workflow engine
    pub fn from_results_status(status: &str) -> Self {
        match status {
            RESULTS_STATUS_SUCCESS => Self::Processed,
            RESULTS_STATUS_INVALID => Self::Invalid,
            _ => Self::Failed,
        }
    }

    /// Exchange folder a file in this status is relocated to
    pub fn relocation_folder(&self) -> &'static str {
        match self {
            Self::Failed | Self::Invalid => folders::FAILED,
            _ => folders::PROCESSED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Preprocess => "preprocess",
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Invalid => "invalid",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "preprocess" => Ok(Self::Preprocess),
            "waiting" => Ok(Self::Waiting),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "invalid" => Ok(Self::Invalid),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid file status: {s}")),
        }
    }
}
