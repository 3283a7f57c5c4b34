// Admin database adapters - active tenants and their credentials
use crate::application::tenant_directory::{CredentialStore, TenantDirectory};
use crate::domain::error::PipelineError;
use crate::domain::tenant::{Tenant, TenantId};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: i64,
    username: String,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant { id: TenantId(row.id), name: row.username }
    }
}

#[derive(Debug, Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn active_tenants(&self) -> Result<Vec<Tenant>, PipelineError> {
        let rows: Vec<TenantRow> =
            sqlx::query_as("SELECT id::bigint AS id, username FROM users WHERE is_active = true ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(PipelineError::storage)?;
        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, PipelineError> {
        let row: Option<TenantRow> =
            sqlx::query_as("SELECT id::bigint AS id, username FROM users WHERE id = $1 AND is_active = true")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(PipelineError::storage)?;
        Ok(row.map(Tenant::from))
    }
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_all(&self, tenant: TenantId) -> Result<HashMap<String, String>, PipelineError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key_name, key_value FROM credentials WHERE user_id = $1")
                .bind(tenant.0)
                .fetch_all(&self.pool)
                .await
                .map_err(PipelineError::storage)?;

        tracing::debug!(tenant_id = %tenant, keys = rows.len(), "Loaded credentials");
        Ok(rows.into_iter().collect())
    }
}
