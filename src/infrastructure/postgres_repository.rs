// Postgres dashboard record store - one table per category
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::{LogicalTableKey, TemplateType};
use crate::domain::dashboard::{DashboardRecord, DestinationKind, SentState};
use crate::domain::error::PipelineError;
use crate::domain::placeholder::DependencyState;
use crate::domain::tenant::TenantId;
use crate::infrastructure::config::DatabaseSettings;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;

const COLUMNS: &str =
    "tenant_id, tenant_name, logical_key, template, remote_url, snapshot_path, dependencies, sent_at, created_at, updated_at";

pub async fn connect_admin_pool(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect(&settings.url)
        .await
        .context("Failed to connect to admin database")
}

#[derive(Debug, sqlx::FromRow)]
struct DashboardRow {
    tenant_id: i64,
    tenant_name: String,
    logical_key: String,
    template: String,
    remote_url: String,
    snapshot_path: Option<String>,
    dependencies: Json<DependencyState>,
    sent_at: Json<SentState>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DashboardRow {
    fn into_record(self, category: DatabaseCategory) -> Result<DashboardRecord, PipelineError> {
        let template = TemplateType::parse(&self.template)
            .ok_or_else(|| PipelineError::Storage(format!("unknown template {} in {}", self.template, category.record_table())))?;

        Ok(DashboardRecord {
            tenant_id: TenantId(self.tenant_id),
            tenant_name: self.tenant_name,
            category,
            logical_key: LogicalTableKey::new(self.logical_key),
            template,
            remote_url: self.remote_url,
            snapshot_path: self.snapshot_path,
            dependencies: self.dependencies.0,
            sent_at: self.sent_at.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgDashboardRepository {
    pool: PgPool,
}

impl PgDashboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the per-category record tables if they do not exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for category in DatabaseCategory::ALL {
            let table = category.record_table();
            let ddl = format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    tenant_id BIGINT NOT NULL,
                    tenant_name TEXT NOT NULL,
                    logical_key TEXT NOT NULL,
                    template TEXT NOT NULL,
                    remote_url TEXT NOT NULL,
                    snapshot_path TEXT,
                    dependencies JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    sent_at JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    UNIQUE (tenant_id, logical_key)
                )"#
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {table}"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardRepository for PgDashboardRepository {
    async fn find(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
    ) -> Result<Option<DashboardRecord>, PipelineError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE tenant_id = $1 AND logical_key = $2",
            category.record_table()
        );
        let row: Option<DashboardRow> = sqlx::query_as(&sql)
            .bind(tenant.0)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        row.map(|r| r.into_record(category)).transpose()
    }

    async fn insert(&self, record: &DashboardRecord) -> Result<(), PipelineError> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            record.category.record_table()
        );
        sqlx::query(&sql)
            .bind(record.tenant_id.0)
            .bind(&record.tenant_name)
            .bind(record.logical_key.as_str())
            .bind(record.template.as_str())
            .bind(&record.remote_url)
            .bind(&record.snapshot_path)
            .bind(Json(&record.dependencies))
            .bind(Json(&record.sent_at))
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(PipelineError::storage)?;
        Ok(())
    }

    async fn update_published(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        remote_url: &str,
        dependencies: &DependencyState,
    ) -> Result<(), PipelineError> {
        let sql = format!(
            "UPDATE {} SET remote_url = $3, dependencies = $4, updated_at = now() \
             WHERE tenant_id = $1 AND logical_key = $2",
            category.record_table()
        );
        expect_one_row(
            sqlx::query(&sql)
                .bind(tenant.0)
                .bind(key.as_str())
                .bind(remote_url)
                .bind(Json(dependencies))
                .execute(&self.pool)
                .await,
            key,
        )
    }

    async fn set_snapshot(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        path: &str,
    ) -> Result<(), PipelineError> {
        let sql = format!(
            "UPDATE {} SET snapshot_path = $3, updated_at = now() WHERE tenant_id = $1 AND logical_key = $2",
            category.record_table()
        );
        expect_one_row(
            sqlx::query(&sql)
                .bind(tenant.0)
                .bind(key.as_str())
                .bind(path)
                .execute(&self.pool)
                .await,
            key,
        )
    }

    async fn pending_notifications(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        kinds: &[DestinationKind],
        since: DateTime<Utc>,
    ) -> Result<Vec<DashboardRecord>, PipelineError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} \
             WHERE tenant_id = $1 AND created_at >= $2 AND NOT (sent_at ?& $3::text[]) \
             ORDER BY created_at",
            category.record_table()
        );
        let kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let rows: Vec<DashboardRow> = sqlx::query_as(&sql)
            .bind(tenant.0)
            .bind(since)
            .bind(&kinds)
            .fetch_all(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        rows.into_iter().map(|r| r.into_record(category)).collect()
    }

    async fn mark_sent(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        kind: DestinationKind,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let sql = format!(
            "UPDATE {} SET sent_at = sent_at || jsonb_build_object($3::text, $4::text) \
             WHERE tenant_id = $1 AND logical_key = $2",
            category.record_table()
        );
        expect_one_row(
            sqlx::query(&sql)
                .bind(tenant.0)
                .bind(key.as_str())
                .bind(kind.as_str())
                .bind(at.to_rfc3339())
                .execute(&self.pool)
                .await,
            key,
        )
    }

    async fn list_for_tenant(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
    ) -> Result<Vec<DashboardRecord>, PipelineError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE tenant_id = $1 ORDER BY logical_key",
            category.record_table()
        );
        let rows: Vec<DashboardRow> = sqlx::query_as(&sql)
            .bind(tenant.0)
            .fetch_all(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        rows.into_iter().map(|r| r.into_record(category)).collect()
    }
}

fn expect_one_row(
    result: Result<sqlx::postgres::PgQueryResult, sqlx::Error>,
    key: &LogicalTableKey,
) -> Result<(), PipelineError> {
    match result {
        Ok(done) if done.rows_affected() == 0 => Err(PipelineError::Storage(format!("no record for {key}"))),
        Ok(_) => Ok(()),
        Err(e) => Err(PipelineError::storage(e)),
    }
}
