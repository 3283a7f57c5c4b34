// Notification dispatcher - at-most-once delivery per record and destination
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::notifier::{ChatNotifier, DashboardNotice, WebhookNotifier};
use crate::domain::category::DatabaseCategory;
use crate::domain::dashboard::{DashboardRecord, DestinationKind};
use crate::domain::error::PipelineError;
use crate::domain::tenant::TenantContext;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub snapshots_sent: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    repository: Arc<dyn DashboardRepository>,
    chat: Arc<dyn ChatNotifier>,
    webhook: Arc<dyn WebhookNotifier>,
    window: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        repository: Arc<dyn DashboardRepository>,
        chat: Arc<dyn ChatNotifier>,
        webhook: Arc<dyn WebhookNotifier>,
        window: Duration,
    ) -> Self {
        Self { repository, chat, webhook, window }
    }

    /// Delivers every pending notification for the tenant. Failures leave the
    /// destination unset so the next pass tries again.
    pub async fn dispatch(&self, ctx: &TenantContext) -> DispatchReport {
        let mut report = DispatchReport::default();

        let mut kinds = Vec::new();
        if ctx.chat.is_some() {
            kinds.push(DestinationKind::Chat);
        }
        if ctx.webhook.is_some() {
            kinds.push(DestinationKind::Webhook);
        }
        if kinds.is_empty() {
            tracing::debug!(tenant_id = %ctx.tenant.id, "No notification destinations configured");
            return report;
        }

        let since = Utc::now() - self.window;
        for category in DatabaseCategory::ALL {
            let pending = match self
                .repository
                .pending_notifications(category, ctx.tenant.id, &kinds, since)
                .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(tenant_id = %ctx.tenant.id, %category, "Cannot list pending notifications: {}", e);
                    continue;
                }
            };

            for record in pending {
                self.notify_record(ctx, &record, &mut report).await;
            }
        }

        report
    }

    async fn notify_record(&self, ctx: &TenantContext, record: &DashboardRecord, report: &mut DispatchReport) {
        let notice = DashboardNotice {
            creator: ctx.tenant.name.clone(),
            table: record.logical_key.to_string(),
            url: record.remote_url.clone(),
            created_at: record.created_at,
        };

        if let Some(chat) = &ctx.chat {
            if !record.sent_at.is_sent(DestinationKind::Chat) {
                match self.chat.post_link(chat, &notice).await {
                    Ok(()) => {
                        self.mark(record, DestinationKind::Chat, report).await;
                        // The link counts as delivered even if the snapshot upload fails.
                        if let Some(path) = self.existing_snapshot(record).await {
                            match self.chat.post_snapshot(chat, &notice, Path::new(&path)).await {
                                Ok(()) => report.snapshots_sent += 1,
                                Err(e) => tracing::warn!(key = %record.logical_key, "Snapshot upload failed: {}", e),
                            }
                        }
                    }
                    Err(e) => self.failed(record, DestinationKind::Chat, e, report),
                }
            }
        }

        if let Some(webhook) = &ctx.webhook {
            if !record.sent_at.is_sent(DestinationKind::Webhook) {
                match self.webhook.post_card(webhook, &notice).await {
                    Ok(()) => self.mark(record, DestinationKind::Webhook, report).await,
                    Err(e) => self.failed(record, DestinationKind::Webhook, e, report),
                }
            }
        }
    }

    async fn mark(&self, record: &DashboardRecord, kind: DestinationKind, report: &mut DispatchReport) {
        report.sent += 1;
        if let Err(e) = self
            .repository
            .mark_sent(record.category, record.tenant_id, &record.logical_key, kind, Utc::now())
            .await
        {
            // Delivered but not recorded; the next pass will deliver again.
            tracing::error!(key = %record.logical_key, destination = %kind, "Cannot record delivery: {}", e);
        }
    }

    fn failed(&self, record: &DashboardRecord, kind: DestinationKind, err: PipelineError, report: &mut DispatchReport) {
        report.failed += 1;
        tracing::warn!(
            tenant_id = %record.tenant_id,
            key = %record.logical_key,
            destination = %kind,
            "Notification failed, will retry next pass: {}",
            err
        );
    }

    /// Snapshot path if the file is still on disk (the janitor may have removed it).
    async fn existing_snapshot(&self, record: &DashboardRecord) -> Option<String> {
        let path = record.snapshot_path.as_ref()?;
        match tokio::fs::try_exists(path).await {
            Ok(true) => Some(path.clone()),
            _ => {
                tracing::debug!(key = %record.logical_key, %path, "Snapshot file no longer present");
                None
            }
        }
    }
}
