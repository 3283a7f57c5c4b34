// Ports for tenant listing, per-tenant credentials and the per-tenant lock
use crate::domain::error::PipelineError;
use crate::domain::tenant::{Tenant, TenantId};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn active_tenants(&self) -> Result<Vec<Tenant>, PipelineError>;

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, PipelineError>;
}

/// Key/value credentials per tenant, read as one map per pass.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_all(&self, tenant: TenantId) -> Result<HashMap<String, String>, PipelineError>;
}

/// Proof of a held tenant lock. Releasing requires the same owner token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    pub tenant: TenantId,
    pub owner: Uuid,
}

/// Non-blocking mutual exclusion per tenant.
#[async_trait]
pub trait TenantLock: Send + Sync {
    /// `None` when another owner holds the lock.
    async fn try_acquire(&self, tenant: TenantId) -> Result<Option<LockGuard>, PipelineError>;

    async fn release(&self, guard: LockGuard) -> Result<(), PipelineError>;
}
