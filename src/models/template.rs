use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing rule plus column mapping for one partner channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub template_id: i64,
    pub name: String,
    pub file_identifier: FileIdentifier,
    pub partner_folder_id: i64,
    /// Partner identity that scopes concurrency and search population
    pub channel_id: i64,
    pub market_id: i64,
    pub column_mapping: serde_json::Value,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileIdentifierType {
    Prefix,
    Suffix,
    Unspecified,
}

impl fmt::Display for FileIdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => write!(f, "prefix"),
            Self::Suffix => write!(f, "suffix"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

impl std::str::FromStr for FileIdentifierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "unspecified" => Ok(Self::Unspecified),
            _ => Err(format!("Invalid file identifier type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentifier {
    #[serde(rename = "type")]
    pub identifier_type: FileIdentifierType,
    pub value: String,
}

impl FileIdentifier {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            identifier_type: FileIdentifierType::Prefix,
            value: value.into(),
        }
    }

    pub fn suffix(value: impl Into<String>) -> Self {
        Self {
            identifier_type: FileIdentifierType::Suffix,
            value: value.into(),
        }
    }

    pub fn unspecified() -> Self {
        Self {
            identifier_type: FileIdentifierType::Unspecified,
            value: String::new(),
        }
    }

    /// Whether `filename` satisfies this rule
    ///
    /// A suffix must sit directly before a dot and a 3 or 4 letter lowercase
    /// extension that ends the filename.
    pub fn matches(&self, filename: &str) -> bool {
        match self.identifier_type {
            FileIdentifierType::Unspecified => true,
            FileIdentifierType::Prefix => filename.starts_with(&self.value),
            FileIdentifierType::Suffix => match filename.rsplit_once('.') {
                Some((stem, extension)) => {
                    is_lowercase_extension(extension) && stem.ends_with(&self.value)
                }
                None => false,
            },
        }
    }
}

fn is_lowercase_extension(extension: &str) -> bool {
    (3..=4).contains(&extension.len()) && extension.bytes().all(|b| b.is_ascii_lowercase())
}
