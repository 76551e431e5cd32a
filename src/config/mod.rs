//! # Configuration
//!
//! Typed configuration for the ingestion service, loaded from
//! `config/ingest-config.yaml` with environment sections merged over the base
//! values (see [`loader::ConfigManager`]).
//!
//! ```yaml
//! exchange:
//!   bucket: "partner-exchange"
//! backfill:
//!   max_parallel_backfills: 1
//! production:
//!   telemetry:
//!     json: true
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration for the ingestion service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    pub environment: String,
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub object_store: ObjectStoreConfig,
    pub workflow: WorkflowConfig,
    pub search: SearchConfig,
    pub backfill: BackfillConfig,
    pub mail: MailConfig,
    pub reaper: ReaperConfig,
    pub web: WebConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_timeout_seconds: 10,
        }
    }
}

/// Shared staging bucket where files live while the workflow engine processes them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub bucket: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            bucket: "partner-exchange".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub root: PathBuf,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub url: String,
    pub api_token: Option<String>,
    pub process_version_group_id: String,
    pub sync_version_group_id: String,
    pub deactivate_version_group_id: String,
    pub change_percent_limit: u32,
    pub error_percent_limit: u32,
    pub timeout_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4200/graphql".to_string(),
            api_token: None,
            process_version_group_id: "ingest-partner-file".to_string(),
            sync_version_group_id: "sync-partner-patients".to_string(),
            deactivate_version_group_id: "deactivate-partner".to_string(),
            change_percent_limit: 25,
            error_percent_limit: 5,
            timeout_seconds: 30,
        }
    }
}

impl WorkflowConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    pub patients_index: String,
    pub backfill_index: String,
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            patients_index: "patients".to_string(),
            backfill_index: "backfill_patients".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub url: String,
    /// Global ceiling on backfills in `processing` at once
    pub max_parallel_backfills: u32,
    pub timeout_seconds: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            max_parallel_backfills: 1,
            timeout_seconds: 30,
        }
    }
}

impl BackfillConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub sender: String,
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8025/api/send".to_string(),
            api_key: None,
            sender: "ingest@localhost".to_string(),
            timeout_seconds: 15,
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_seconds: u64,
    /// Files idle in a transient status longer than this are expired
    pub expiry_threshold_minutes: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            expiry_threshold_minutes: 360,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn expiry_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_threshold_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: Option<String>,
    pub json: bool,
}

impl IngestConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.exchange.bucket.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "exchange.bucket",
                "exchange configuration",
            ));
        }

        if self.backfill.max_parallel_backfills == 0 {
            return Err(ConfigurationError::invalid_value(
                "backfill.max_parallel_backfills",
                "0",
                "at least one backfill must be allowed to run",
            ));
        }

        for (field, seconds) in [
            ("workflow.timeout_seconds", self.workflow.timeout_seconds),
            ("search.timeout_seconds", self.search.timeout_seconds),
            ("backfill.timeout_seconds", self.backfill.timeout_seconds),
            ("mail.timeout_seconds", self.mail.timeout_seconds),
            ("reaper.interval_seconds", self.reaper.interval_seconds),
        ] {
            if seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "must be greater than 0",
                ));
            }
        }

        if self.reaper.expiry_threshold_minutes <= 0 {
            return Err(ConfigurationError::invalid_value(
                "reaper.expiry_threshold_minutes",
                self.reaper.expiry_threshold_minutes.to_string(),
                "must be greater than 0",
            ));
        }

        if self.search.patients_index == self.search.backfill_index {
            return Err(ConfigurationError::invalid_value(
                "search.backfill_index",
                self.search.backfill_index.clone(),
                "backfill index must differ from the patients index",
            ));
        }

        Ok(())
    }

    /// Database URL, with `DATABASE_URL` taking precedence over the file
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database.url.clone())
    }
}
