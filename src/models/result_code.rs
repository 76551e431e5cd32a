use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a result code describes the whole file or individual rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLevel {
    File,
    Row,
}

impl fmt::Display for CodeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Row => write!(f, "row"),
        }
    }
}

impl std::str::FromStr for CodeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "row" => Ok(Self::Row),
            _ => Err(format!("Invalid result code level: {s}")),
        }
    }
}

/// Catalog entry for a failure or warning cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCode {
    pub result_code_id: i64,
    pub code: String,
    pub description: String,
    pub level: CodeLevel,
}

/// A ledger entry linking a file to a result code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileResultCode {
    pub file_id: i64,
    pub result_code_id: i64,
    pub occurrences: i64,
    pub first_occurrence: Option<i64>,
    pub fields: Vec<String>,
    pub error: Option<String>,
}

/// Ledger entry joined with its catalog entry, as shown to partners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResultCodeDetail {
    pub code: String,
    pub description: String,
    pub level: CodeLevel,
    pub occurrences: i64,
    pub first_occurrence: Option<i64>,
    pub fields: Vec<String>,
    pub error: Option<String>,
}
