//! Payloads written back by the workflow engine.
//!
//! The engine serializes channel and market ids as JSON strings, so those fields
//! go through [`string_id`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::RESULTS_STATUS_SUCCESS;

/// Standard (and refresh) results of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPayload {
    pub flow_run_id: String,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub number_new: usize,
    #[serde(default)]
    pub number_deleted: usize,
    #[serde(default)]
    pub number_updated: usize,
    #[serde(default)]
    pub records: ResultRecords,
    #[serde(default)]
    pub row_errors: Vec<RowError>,
    #[serde(default)]
    pub file_errors: Vec<FileError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultRecords {
    pub new: Vec<PatientRecord>,
    /// Patient hashes removed since the previous file
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    pub patient_hash: String,
    pub row_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub gender: String,
    pub ssn: String,
    pub street_address_1: String,
    pub street_address_2: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub member_id: String,
    pub email: String,
    #[serde(with = "string_id")]
    pub channel_item_id: i64,
    #[serde(with = "string_id")]
    pub market_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub field: String,
    pub number_failed: i64,
    pub first_occurrence: i64,
    pub error_code: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    #[serde(default)]
    pub fields: Vec<String>,
    pub error_code: String,
    pub error: String,
}

impl ResultsPayload {
    pub fn is_success(&self) -> bool {
        self.status == RESULTS_STATUS_SUCCESS
    }

    /// Declared counts must agree with the records actually delivered
    pub fn count_mismatch(&self) -> Option<String> {
        if self.records.new.len() != self.number_new {
            return Some(format!(
                "number_new is {} but {} new records were delivered",
                self.number_new,
                self.records.new.len()
            ));
        }
        if self.records.deleted.len() != self.number_deleted {
            return Some(format!(
                "number_deleted is {} but {} deleted records were delivered",
                self.number_deleted,
                self.records.deleted.len()
            ));
        }
        None
    }

    pub fn result_code_count(&self) -> usize {
        self.row_errors.len() + self.file_errors.len()
    }
}

/// Outcome of a partner deactivation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResultsPayload {
    pub flow_run_id: String,
    pub bucket_folder_id: i64,
    pub status: String,
    /// Channel id (as the engine spells it) to number of deleted patients
    #[serde(default)]
    pub number_deleted_by_channel_item_id: BTreeMap<String, i64>,
    #[serde(default)]
    pub errors: Vec<DeleteResultsError>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResultsError {
    pub error: String,
    pub error_code: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Serialize an integer id as a JSON string, accepting either form on input
pub mod string_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrInt {
            String(String),
            Int(i64),
        }

        match StringOrInt::deserialize(deserializer)? {
            StringOrInt::Int(value) => Ok(value),
            StringOrInt::String(value) => value.trim().parse().map_err(de::Error::custom),
        }
    }
}
