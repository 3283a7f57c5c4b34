// Port for rendering a published dashboard into an animated image
use crate::domain::error::PipelineError;
use crate::domain::tenant::Secret;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait SnapshotCapturer: Send + Sync {
    /// Path of the written image. Failures are `PipelineError::Capture`.
    async fn capture(&self, dashboard_url: &str, auth_token: &Secret) -> Result<PathBuf, PipelineError>;
}

/// Deletes snapshot files past their retention age.
#[async_trait]
pub trait SnapshotRetention: Send + Sync {
    /// Number of files removed.
    async fn sweep(&self) -> Result<usize, PipelineError>;
}
