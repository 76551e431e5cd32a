//! # Partner Notifications
//!
//! Processing and deletion reports emailed to a partner's registered
//! recipients through an HTTP mail API.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::debug;

use crate::config::MailConfig;
use crate::constants::MAX_NOTIFICATION_ERRORS;
use crate::models::{CodeLevel, DeleteResultsError, FileCounters, FileResultCodeDetail};
use crate::state_machine::FileStatus;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Mail request failed: {0}")]
    Request(String),

    #[error("Mail API returned HTTP {status}: {message}")]
    Response { status: u16, message: String },
}

impl From<reqwest::Error> for NotifierError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub partner_name: String,
    pub filename: String,
    pub status: FileStatus,
    pub is_backfill: bool,
    pub result_codes: Vec<FileResultCodeDetail>,
    pub counters: FileCounters,
    /// Channel population after this file, when it could be determined
    pub total_population: Option<i64>,
    /// Patients matched by a finished backfill
    pub backfill_matches: Option<i64>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedReport {
    pub partner_name: String,
    pub status: String,
    pub deleted_by_channel: BTreeMap<String, i64>,
    pub errors: Vec<DeleteResultsError>,
    pub recipients: Vec<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_processing_report(&self, report: &ProcessingReport) -> Result<(), NotifierError>;

    async fn send_deleted_report(&self, report: &DeletedReport) -> Result<(), NotifierError>;
}

impl ProcessingReport {
    pub fn subject(&self) -> String {
        let kind = if self.is_backfill { "Backfill" } else { "File" };
        format!("{kind} {} for {}: {}", self.filename, self.partner_name, self.status)
    }

    /// Plain text body; file-level codes are listed before row-level ones
    pub fn render(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "File: {}", self.filename);
        let _ = writeln!(text, "Status: {}", self.status);
        let _ = writeln!(text, "New patients: {}", self.counters.loaded);
        let _ = writeln!(text, "Updated patients: {}", self.counters.updated);
        let _ = writeln!(text, "Deleted patients: {}", self.counters.deleted);
        if let Some(total) = self.total_population {
            let _ = writeln!(text, "Total patients: {total}");
        }
        if let Some(matches) = self.backfill_matches {
            let _ = writeln!(text, "Backfill matches: {matches}");
        }

        if !self.result_codes.is_empty() {
            let mut ordered: Vec<&FileResultCodeDetail> = self.result_codes.iter().collect();
            ordered.sort_by_key(|code| match code.level {
                CodeLevel::File => 0,
                CodeLevel::Row => 1,
            });

            let _ = writeln!(text, "\nErrors:");
            for code in ordered.iter().take(MAX_NOTIFICATION_ERRORS) {
                let detail = code.error.as_deref().unwrap_or(&code.description);
                let _ = write!(text, "- [{}] {}", code.code, detail);
                if !code.fields.is_empty() {
                    let _ = write!(text, " (fields: {})", code.fields.join(", "));
                }
                if code.level == CodeLevel::Row {
                    let _ = write!(text, " x{}", code.occurrences);
                    if let Some(first) = code.first_occurrence {
                        let _ = write!(text, ", first at row {first}");
                    }
                }
                text.push('\n');
            }
            if ordered.len() > MAX_NOTIFICATION_ERRORS {
                let _ = writeln!(
                    text,
                    "...and {} more",
                    ordered.len() - MAX_NOTIFICATION_ERRORS
                );
            }
        }
        text
    }
}

impl DeletedReport {
    pub fn subject(&self) -> String {
        format!("Partner {} deactivated: {}", self.partner_name, self.status)
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for (channel, deleted) in &self.deleted_by_channel {
            let _ = writeln!(text, "Channel {channel}: {deleted} patients deleted");
        }
        for error in self.errors.iter().take(MAX_NOTIFICATION_ERRORS) {
            let _ = writeln!(text, "- [{}] {}", error.error_code, error.error);
        }
        text
    }
}

/// Mail API client
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    config: MailConfig,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(config: MailConfig) -> Result<Self, NotifierError> {
        let client = super::http_client(config.timeout())?;
        Ok(Self { config, client })
    }

    async fn send(&self, recipients: &[String], subject: String, text: String) -> Result<(), NotifierError> {
        let mut builder = self.client.post(&self.config.url).json(&serde_json::json!({
            "from": self.config.sender,
            "to": recipients,
            "subject": subject,
            "text": text,
        }));
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Response {
                status: status.as_u16(),
                message: super::error_body(response).await,
            });
        }

        debug!(recipients = recipients.len(), subject = %subject, "Notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_processing_report(&self, report: &ProcessingReport) -> Result<(), NotifierError> {
        self.send(&report.recipients, report.subject(), report.render())
            .await
    }

    async fn send_deleted_report(&self, report: &DeletedReport) -> Result<(), NotifierError> {
        self.send(&report.recipients, report.subject(), report.render())
            .await
    }
}
