// Repository trait for persisted dashboard records
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::LogicalTableKey;
use crate::domain::dashboard::{DashboardRecord, DestinationKind};
use crate::domain::error::PipelineError;
use crate::domain::placeholder::DependencyState;
use crate::domain::tenant::TenantId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One record store per category, unique on (tenant, logical key).
#[async_trait]
pub trait DashboardRepository: Send + Sync {
    async fn find(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
    ) -> Result<Option<DashboardRecord>, PipelineError>;

    async fn insert(&self, record: &DashboardRecord) -> Result<(), PipelineError>;

    /// Overwrites the remote URL and dependency state of an existing record in place.
    async fn update_published(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        remote_url: &str,
        dependencies: &DependencyState,
    ) -> Result<(), PipelineError>;

    async fn set_snapshot(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        path: &str,
    ) -> Result<(), PipelineError>;

    /// Records created at or after `since` where any of `kinds` is still unset.
    async fn pending_notifications(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        kinds: &[DestinationKind],
        since: DateTime<Utc>,
    ) -> Result<Vec<DashboardRecord>, PipelineError>;

    async fn mark_sent(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        kind: DestinationKind,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    async fn list_for_tenant(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
    ) -> Result<Vec<DashboardRecord>, PipelineError>;
}
