// Ports for reading a tenant database's schema
use crate::domain::error::PipelineError;
use crate::domain::tenant::DatabaseTarget;
use async_trait::async_trait;

#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Names of the tables in the public schema.
    async fn list_tables(&self) -> Result<Vec<String>, PipelineError>;

    async fn table_exists(&self, table: &str) -> Result<bool, PipelineError>;
}

/// Opens a schema inspector for one tenant database. Failure to connect is a
/// `ConnectionFailure` and aborts the category.
#[async_trait]
pub trait SchemaConnector: Send + Sync {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn SchemaInspector>, PipelineError>;
}
