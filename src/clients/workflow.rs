//! # Workflow Engine Client
//!
//! The engine runs the heavy transformation of a staged file and later writes a
//! results object back to the exchange bucket. Runs are created through a
//! GraphQL `create_flow_run` mutation; the returned run id is the correlation
//! id used to match the results back to their file.
//!
//! Requests are built separately from submission so a build failure and a
//! call failure can be reported to the partner under different result codes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::WorkflowConfig;
use crate::models::{File, Template};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to build workflow request: {0}")]
    Build(String),

    #[error("Workflow request timed out: {0}")]
    Timeout(String),

    #[error("Workflow request failed: {0}")]
    Request(String),

    #[error("Workflow engine returned HTTP {status}: {message}")]
    Response { status: u16, message: String },

    #[error("Workflow engine rejected the run: {0}")]
    Rejected(String),
}

impl WorkflowError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

/// Where the workflow engine should read the staged file from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeLocation {
    pub bucket: String,
    pub key: String,
}

impl ExchangeLocation {
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn build_process_request(
        &self,
        template: &Template,
        file: &File,
        exchange: &ExchangeLocation,
    ) -> Result<Vec<u8>, WorkflowError>;

    fn build_sync_request(&self, channel_id: i64) -> Result<Vec<u8>, WorkflowError>;

    fn build_deactivate_request(
        &self,
        partner_folder_id: i64,
        channel_ids: &[i64],
    ) -> Result<Vec<u8>, WorkflowError>;

    /// Submit a built request and return the run id
    async fn submit(&self, request: Vec<u8>) -> Result<String, WorkflowError>;
}

#[derive(Debug, Deserialize)]
struct FlowRunResponse {
    data: Option<FlowRunData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct FlowRunData {
    create_flow_run: Option<CreatedFlowRun>,
}

#[derive(Debug, Deserialize)]
struct CreatedFlowRun {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// GraphQL client for the workflow engine
#[derive(Debug, Clone)]
pub struct GraphqlWorkflowEngine {
    config: WorkflowConfig,
    client: reqwest::Client,
}

impl GraphqlWorkflowEngine {
    pub fn new(config: WorkflowConfig) -> Result<Self, WorkflowError> {
        if config.url.is_empty() {
            return Err(WorkflowError::Build("workflow URL is empty".to_string()));
        }
        let client = super::http_client(config.timeout())
            .map_err(|e| WorkflowError::Build(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Wrap run parameters in a `create_flow_run` mutation
    ///
    /// The engine takes parameters as a JSON document embedded in a GraphQL string.
    fn mutation(
        version_group_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<Vec<u8>, WorkflowError> {
        if version_group_id.is_empty() {
            return Err(WorkflowError::Build("version group id is empty".to_string()));
        }

        let encoded_parameters = serde_json::to_string(parameters)
            .and_then(|document| serde_json::to_string(&document))
            .map_err(|e| WorkflowError::Build(e.to_string()))?;

        let query = format!(
            "mutation {{ create_flow_run( input: {{ version_group_id: \"{version_group_id}\", \
             parameters: {encoded_parameters} }} ) {{ id }} }}"
        );

        serde_json::to_vec(&json!({ "query": query }))
            .map_err(|e| WorkflowError::Build(e.to_string()))
    }
}

#[async_trait]
impl WorkflowEngine for GraphqlWorkflowEngine {
    fn build_process_request(
        &self,
        template: &Template,
        file: &File,
        exchange: &ExchangeLocation,
    ) -> Result<Vec<u8>, WorkflowError> {
        if !template.column_mapping.is_object() {
            return Err(WorkflowError::Build(format!(
                "template {} has no column mapping",
                template.template_id
            )));
        }

        let parameters = json!({
            "ingestion_filepath": exchange.uri(),
            "force": file.is_forced(),
            "only_validate": file.is_backfill,
            "column_mappings": template.column_mapping,
            "channel_item_id": template.channel_id,
            "market_id": template.market_id,
            "change_percent_limit": self.config.change_percent_limit,
            "error_percent_limit": self.config.error_percent_limit,
        });

        Self::mutation(&self.config.process_version_group_id, &parameters)
    }

    fn build_sync_request(&self, channel_id: i64) -> Result<Vec<u8>, WorkflowError> {
        Self::mutation(
            &self.config.sync_version_group_id,
            &json!({ "channel_item_id": channel_id }),
        )
    }

    fn build_deactivate_request(
        &self,
        partner_folder_id: i64,
        channel_ids: &[i64],
    ) -> Result<Vec<u8>, WorkflowError> {
        Self::mutation(
            &self.config.deactivate_version_group_id,
            &json!({
                "bucket_folder_id": partner_folder_id,
                "channel_item_ids": channel_ids,
            }),
        )
    }

    async fn submit(&self, request: Vec<u8>) -> Result<String, WorkflowError> {
        let mut builder = self
            .client
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = super::error_body(response).await;
            error!(status = %status, error = %message, "Workflow engine request failed");
            return Err(WorkflowError::Response {
                status: status.as_u16(),
                message,
            });
        }

        let body: FlowRunResponse = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(WorkflowError::Rejected(messages.join("; ")));
        }

        let run_id = body
            .data
            .and_then(|data| data.create_flow_run)
            .map(|run| run.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WorkflowError::Rejected("response carried no flow run id".to_string()))?;

        debug!(flow_run_id = %run_id, "Workflow run created");
        Ok(run_id)
    }
}
