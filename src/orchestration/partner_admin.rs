//! Operator-initiated workflow runs that are not tied to a file.
//!
//! Their results come back through the refresh and delete variants of results
//! ingestion.

use std::collections::BTreeSet;
use tracing::{info, instrument};

use super::context::PipelineContext;
use super::errors::AdminError;

/// A submitted operator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRun {
    pub flow_run_id: String,
    pub channel_ids: Vec<i64>,
}

pub struct PartnerAdmin {
    ctx: PipelineContext,
}

impl PartnerAdmin {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Rebuild one channel's documents from the workflow engine's copy
    #[instrument(skip(self))]
    pub async fn request_refresh(&self, channel_id: i64) -> Result<AdminRun, AdminError> {
        let request = self.ctx.workflow.build_sync_request(channel_id)?;
        let flow_run_id = self.ctx.workflow.submit(request).await?;

        info!(correlation_id = %flow_run_id, "Channel resync submitted");
        Ok(AdminRun {
            flow_run_id,
            channel_ids: vec![channel_id],
        })
    }

    /// Remove a partner's channels, or all of them when `channels` is `None`
    ///
    /// Every requested channel must belong to one of the folder's templates.
    /// The folder is marked deactivated only when all its channels go.
    #[instrument(skip(self))]
    pub async fn request_deactivation(
        &self,
        partner_folder_id: i64,
        channels: Option<Vec<i64>>,
    ) -> Result<AdminRun, AdminError> {
        let store = &self.ctx.store;
        store.find_partner_folder(partner_folder_id).await?;

        let owned: BTreeSet<i64> = store
            .active_templates_for_folder(partner_folder_id)
            .await?
            .iter()
            .map(|template| template.channel_id)
            .collect();
        if owned.is_empty() {
            return Err(AdminError::NoChannels(partner_folder_id));
        }

        let targets: BTreeSet<i64> = match channels {
            Some(requested) if !requested.is_empty() => {
                if let Some(&stray) = requested.iter().find(|id| !owned.contains(*id)) {
                    return Err(AdminError::ChannelNotInFolder {
                        channel_id: stray,
                        partner_folder_id,
                    });
                }
                requested.into_iter().collect()
            }
            _ => owned.clone(),
        };
        let whole_folder = targets == owned;
        let channel_ids: Vec<i64> = targets.into_iter().collect();

        let request = self
            .ctx
            .workflow
            .build_deactivate_request(partner_folder_id, &channel_ids)?;
        let flow_run_id = self.ctx.workflow.submit(request).await?;

        if whole_folder {
            store
                .set_partner_folder_deactivated(partner_folder_id, true)
                .await?;
        }

        info!(
            correlation_id = %flow_run_id,
            channels = channel_ids.len(),
            whole_folder = whole_folder,
            "Partner deactivation submitted"
        );
        Ok(AdminRun {
            flow_run_id,
            channel_ids,
        })
    }
}
