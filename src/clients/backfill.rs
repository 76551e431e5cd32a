use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::BackfillConfig;
use crate::models::BackfillWindow;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Backfill request failed: {0}")]
    Request(String),

    #[error("Backfill service returned HTTP {status}: {message}")]
    Response { status: u16, message: String },
}

impl From<reqwest::Error> for BackfillError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

/// Starts the historical reprocessing of a channel once its file validated
#[async_trait]
pub trait BackfillTrigger: Send + Sync {
    async fn start(&self, channel_id: i64, window: BackfillWindow) -> Result<(), BackfillError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackfillTrigger {
    config: BackfillConfig,
    client: reqwest::Client,
}

impl HttpBackfillTrigger {
    pub fn new(config: BackfillConfig) -> Result<Self, BackfillError> {
        let client = super::http_client(config.timeout())?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl BackfillTrigger for HttpBackfillTrigger {
    async fn start(&self, channel_id: i64, window: BackfillWindow) -> Result<(), BackfillError> {
        let url = format!("{}/api/v1/backfills", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&json!({
                "channel_item_id": channel_id,
                "start_date": window.start_date,
                "end_date": window.end_date,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackfillError::Response {
                status: status.as_u16(),
                message: super::error_body(response).await,
            });
        }

        info!(
            channel_id = channel_id,
            start_date = %window.start_date,
            end_date = %window.end_date,
            "Backfill started"
        );
        Ok(())
    }
}
