// Scheduler - periodic passes over every active tenant
use crate::application::orchestrator::{PassOutcome, PipelineOrchestrator};
use crate::application::snapshot_capturer::SnapshotRetention;
use crate::application::tenant_directory::TenantDirectory;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tenants: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Scheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    tenants: Arc<dyn TenantDirectory>,
    retention: Option<Arc<dyn SnapshotRetention>>,
    interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        tenants: Arc<dyn TenantDirectory>,
        retention: Option<Arc<dyn SnapshotRetention>>,
        interval: Duration,
        run_on_start: bool,
    ) -> Self {
        Self { orchestrator, tenants, retention, interval, run_on_start }
    }

    /// Ticks until `cancel` fires. A tick in progress finishes its current
    /// tenant but starts no new one.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.run_on_start {
            // the first tick completes immediately
            interval.tick().await;
        }

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let summary = self.tick(&cancel).await;
                    tracing::info!(
                        tenants = summary.tenants,
                        completed = summary.completed,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "Scheduled pass finished"
                    );
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    pub async fn tick(&self, cancel: &CancellationToken) -> TickSummary {
        let mut summary = TickSummary::default();

        if let Some(retention) = &self.retention {
            match retention.sweep().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Removed expired snapshots"),
                Err(e) => tracing::warn!("Snapshot retention sweep failed: {}", e),
            }
        }

        let tenants = match self.tenants.active_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!("Cannot list active tenants: {}", e);
                return summary;
            }
        };
        summary.tenants = tenants.len();

        for tenant in tenants {
            if cancel.is_cancelled() {
                break;
            }
            match self.orchestrator.run_pass(&tenant, cancel).await {
                Ok(PassOutcome::Completed(_)) => summary.completed += 1,
                Ok(PassOutcome::LockHeld) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(tenant_id = %tenant.id, "Pass failed: {}", e);
                }
            }
        }

        summary
    }
}
