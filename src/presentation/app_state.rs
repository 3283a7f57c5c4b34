// Application state for HTTP handlers
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::orchestrator::PipelineOrchestrator;
use crate::application::tenant_directory::TenantDirectory;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub repository: Arc<dyn DashboardRepository>,
    pub cancel: CancellationToken,
}
