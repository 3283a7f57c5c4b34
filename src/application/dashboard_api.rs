// Ports for the remote dashboard service and its datasource directory
use crate::domain::dashboard::RenderedDashboard;
use crate::domain::error::PipelineError;
use crate::domain::tenant::{DatabaseTarget, GrafanaCredentials};
use async_trait::async_trait;

#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Returns the absolute URL of the created dashboard.
    async fn create_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError>;

    /// Overwrites an existing dashboard with the same uid. Returns its absolute URL.
    async fn update_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError>;
}

#[async_trait]
pub trait DatasourceDirectory: Send + Sync {
    /// Uid of the datasource whose name equals `name` exactly.
    async fn find_by_name(
        &self,
        grafana: &GrafanaCredentials,
        name: &str,
    ) -> Result<Option<String>, PipelineError>;

    /// Creates a postgres datasource named after the target database and returns its uid.
    async fn create_postgres(
        &self,
        grafana: &GrafanaCredentials,
        target: &DatabaseTarget,
    ) -> Result<String, PipelineError>;
}
