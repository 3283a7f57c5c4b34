// Pipeline error taxonomy
use thiserror::Error;

/// How far a failure is allowed to propagate within a tenant pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Only the current table or group is abandoned.
    Item,
    /// The whole database category is abandoned.
    Category,
    /// Logged and ignored; later stages continue.
    NonFatal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required credential {key} is not configured")]
    ConfigurationMissing { key: String },

    #[error("cannot reach tenant database {database}: {reason}")]
    ConnectionFailure { database: String, reason: String },

    #[error("table {table} matches no classification rule")]
    ClassificationMiss { table: String },

    #[error("{operation} failed: {reason}")]
    RemoteApi { operation: &'static str, reason: String },

    #[error("template {template} could not be rendered: {reason}")]
    Render { template: String, reason: String },

    #[error("record store error: {0}")]
    Storage(String),

    #[error("snapshot capture failed: {0}")]
    Capture(String),

    #[error("notification to {destination} failed: {reason}")]
    Notification { destination: &'static str, reason: String },
}

impl PipelineError {
    pub fn remote(operation: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::RemoteApi { operation, reason: err.to_string() }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        PipelineError::Storage(err.to_string())
    }

    pub fn scope(&self) -> FailureScope {
        match self {
            PipelineError::ConfigurationMissing { .. } | PipelineError::ConnectionFailure { .. } => {
                FailureScope::Category
            }
            PipelineError::ClassificationMiss { .. }
            | PipelineError::RemoteApi { .. }
            | PipelineError::Render { .. }
            | PipelineError::Storage(_) => FailureScope::Item,
            PipelineError::Capture(_) | PipelineError::Notification { .. } => FailureScope::NonFatal,
        }
    }
}
