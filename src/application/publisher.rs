// Dashboard publisher - idempotent reconciliation of rendered dashboards
use crate::application::dashboard_api::DashboardApi;
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::LogicalTableKey;
use crate::domain::dashboard::{NewDashboardRecord, RenderedDashboard};
use crate::domain::error::PipelineError;
use crate::domain::placeholder::DependencyState;
use crate::domain::tenant::{GrafanaCredentials, Tenant};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub url: String,
    pub created: bool,
    pub updated: bool,
}

impl PublishOutcome {
    pub fn changed(&self) -> bool {
        self.created || self.updated
    }
}

pub struct PublishRequest<'a> {
    pub tenant: &'a Tenant,
    pub category: DatabaseCategory,
    pub key: &'a LogicalTableKey,
    pub dashboard: &'a RenderedDashboard,
    pub dependencies: &'a DependencyState,
}

#[derive(Clone)]
pub struct DashboardPublisher {
    repository: Arc<dyn DashboardRepository>,
    api: Arc<dyn DashboardApi>,
}

impl DashboardPublisher {
    pub fn new(repository: Arc<dyn DashboardRepository>, api: Arc<dyn DashboardApi>) -> Self {
        Self { repository, api }
    }

    /// One create per first-time key, one update per dependency transition,
    /// no remote call otherwise.
    pub async fn publish(
        &self,
        grafana: &GrafanaCredentials,
        request: PublishRequest<'_>,
    ) -> Result<PublishOutcome, PipelineError> {
        let PublishRequest { tenant, category, key, dashboard, dependencies } = request;

        let existing = self.repository.find(category, tenant.id, key).await?;

        let Some(record) = existing else {
            let url = self.api.create_dashboard(grafana, dashboard).await?;
            let record = NewDashboardRecord {
                tenant_id: tenant.id,
                tenant_name: tenant.name.clone(),
                category,
                logical_key: key.clone(),
                template: dashboard.template,
                remote_url: url.clone(),
                dependencies: dependencies.clone(),
            }
            .into_record(Utc::now());
            self.repository.insert(&record).await?;

            tracing::info!(tenant_id = %tenant.id, %category, %key, %url, "Created dashboard");
            return Ok(PublishOutcome { url, created: true, updated: false });
        };

        let transitions = dependencies.transitions(&record.dependencies);
        if transitions.is_empty() {
            tracing::debug!(tenant_id = %tenant.id, %category, %key, "Dashboard unchanged, skipping");
            return Ok(PublishOutcome { url: record.remote_url, created: false, updated: false });
        }

        let url = self.api.update_dashboard(grafana, dashboard).await?;
        self.repository
            .update_published(category, tenant.id, key, &url, dependencies)
            .await?;

        tracing::info!(
            tenant_id = %tenant.id,
            %category,
            %key,
            changed = ?transitions,
            "Updated dashboard after dependency change"
        );
        Ok(PublishOutcome { url, created: false, updated: true })
    }
}
