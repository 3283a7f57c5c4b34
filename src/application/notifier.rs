// Notification ports and the message content shared by every destination
use crate::domain::error::PipelineError;
use crate::domain::tenant::{ChatDestination, WebhookDestination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// What a notification says about a published dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardNotice {
    pub creator: String,
    pub table: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Posts the link message. Succeeds only when the chat service confirms it.
    async fn post_link(&self, destination: &ChatDestination, notice: &DashboardNotice) -> Result<(), PipelineError>;

    /// Uploads the snapshot (request slot, upload bytes, finalize) and posts it.
    async fn post_snapshot(
        &self,
        destination: &ChatDestination,
        notice: &DashboardNotice,
        snapshot: &Path,
    ) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn post_card(&self, destination: &WebhookDestination, notice: &DashboardNotice) -> Result<(), PipelineError>;
}
