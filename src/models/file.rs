use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::FileStatus;

/// An ingested partner file
///
/// `object_key` is the current location of the file: the partner bucket key
/// until it is staged, then the exchange bucket key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub file_id: i64,
    pub filename: String,
    pub partner_folder_id: i64,
    pub object_key: String,
    pub status: FileStatus,
    pub template_id: Option<i64>,
    pub is_backfill: bool,
    pub file_parameters: FileParameters,
    pub flow_run_id: Option<String>,
    pub counters: FileCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// New File for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFile {
    pub filename: String,
    pub partner_folder_id: i64,
    pub object_key: String,
    pub status: FileStatus,
    pub template_id: Option<i64>,
    pub is_backfill: bool,
    pub file_parameters: FileParameters,
}

/// Patient counters reported by the workflow engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounters {
    pub loaded: i64,
    pub updated: i64,
    pub deleted: i64,
}

/// Upload options: a backfill date window or a forced upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileParameters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub force_upload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("force upload cannot be combined with a backfill date window")]
    ForceUploadWithWindow,

    #[error("a backfill needs both a start date and an end date")]
    IncompleteWindow,

    #[error("backfill start date {start} is after end date {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },
}

impl FileParameters {
    pub fn backfill(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            force_upload: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            force_upload: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        let has_window = self.start_date.is_some() || self.end_date.is_some();
        if self.force_upload && has_window {
            return Err(ParameterError::ForceUploadWithWindow);
        }

        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => {
                Err(ParameterError::InvertedWindow { start, end })
            }
            (Some(_), None) | (None, Some(_)) => Err(ParameterError::IncompleteWindow),
            _ => Ok(()),
        }
    }

    /// A file is a backfill exactly when both window dates are present
    pub fn is_backfill(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    pub fn backfill_window(&self) -> Option<BackfillWindow> {
        match (self.start_date, self.end_date) {
            (Some(start_date), Some(end_date)) => Some(BackfillWindow {
                start_date,
                end_date,
            }),
            _ => None,
        }
    }
}

impl File {
    /// The workflow engine is told to skip its change limits for these files
    pub fn is_forced(&self) -> bool {
        self.is_backfill || self.file_parameters.force_upload
    }
}
