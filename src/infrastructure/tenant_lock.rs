// Per-tenant mutual exclusion on Postgres session advisory locks
use crate::application::tenant_directory::{LockGuard, TenantLock};
use crate::domain::error::PipelineError;
use crate::domain::tenant::TenantId;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Advisory locks belong to a database session, so the connection that took
/// the lock is kept out of the pool until the same owner releases it.
pub struct PgTenantLock {
    pool: PgPool,
    sessions: Mutex<HashMap<Uuid, PoolConnection<Postgres>>>,
}

impl PgTenantLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, sessions: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl TenantLock for PgTenantLock {
    async fn try_acquire(&self, tenant: TenantId) -> Result<Option<LockGuard>, PipelineError> {
        let mut conn = self.pool.acquire().await.map_err(PipelineError::storage)?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(tenant.0)
            .fetch_one(&mut *conn)
            .await
            .map_err(PipelineError::storage)?;

        if !acquired {
            return Ok(None);
        }

        let owner = Uuid::new_v4();
        self.sessions.lock().await.insert(owner, conn);
        tracing::debug!(tenant_id = %tenant, %owner, "Acquired tenant lock");
        Ok(Some(LockGuard { tenant, owner }))
    }

    async fn release(&self, guard: LockGuard) -> Result<(), PipelineError> {
        let Some(mut conn) = self.sessions.lock().await.remove(&guard.owner) else {
            return Err(PipelineError::Storage(format!(
                "tenant {} lock is not held by {}",
                guard.tenant, guard.owner
            )));
        };

        let released: bool = match sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(guard.tenant.0)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(released) => released,
            Err(e) => {
                // closing the session drops every advisory lock it holds
                drop(conn.detach());
                return Err(PipelineError::storage(e));
            }
        };

        if !released {
            tracing::warn!(tenant_id = %guard.tenant, "Advisory lock was already gone at release");
        }
        Ok(())
    }
}
