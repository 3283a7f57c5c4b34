// Tenant database schema inspection over short-lived sqlx pools
use crate::application::schema_inspector::{SchemaConnector, SchemaInspector};
use crate::domain::error::PipelineError;
use crate::domain::tenant::DatabaseTarget;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PgSchemaConnector {
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PgSchemaConnector {
    pub fn new(connect_timeout: Duration, statement_timeout: Duration) -> Self {
        Self { connect_timeout, statement_timeout }
    }
}

/// Tenant connections carry a session `statement_timeout`, so a stalled
/// catalog query errors out instead of holding the tenant lock.
fn connect_options(target: &DatabaseTarget, statement_timeout: Duration) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.user)
        .password(target.password.expose())
        .database(&target.database)
        .ssl_mode(if target.ssl { PgSslMode::Require } else { PgSslMode::Prefer })
        .options([("statement_timeout", format!("{}ms", statement_timeout.as_millis()))])
}

#[async_trait]
impl SchemaConnector for PgSchemaConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn SchemaInspector>, PipelineError> {
        let options = connect_options(target, self.statement_timeout);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(self.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| PipelineError::ConnectionFailure {
                database: target.database.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(PgSchemaInspector { pool }))
    }
}

pub struct PgSchemaInspector {
    pool: PgPool,
}

#[async_trait]
impl SchemaInspector for PgSchemaInspector {
    async fn list_tables(&self) -> Result<Vec<String>, PipelineError> {
        sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::ConnectionFailure { database: "tenant schema".into(), reason: e.to_string() })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, PipelineError> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(PipelineError::storage)
    }
}
