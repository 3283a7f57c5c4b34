// Main entry point - Dependency injection, scheduler and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::dispatcher::NotificationDispatcher;
use crate::application::orchestrator::{PipelineDeps, PipelineOrchestrator};
use crate::application::publisher::DashboardPublisher;
use crate::application::renderer::TemplateRenderer;
use crate::application::scheduler::Scheduler;
use crate::application::snapshot_capturer::{SnapshotCapturer, SnapshotRetention};
use crate::domain::classification::RuleSet;
use crate::infrastructure::browser_capture::BrowserCapturer;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::grafana_client::GrafanaClient;
use crate::infrastructure::postgres_repository::{connect_admin_pool, PgDashboardRepository};
use crate::infrastructure::postgres_tenants::{PgCredentialStore, PgTenantDirectory};
use crate::infrastructure::schema_inspector::PgSchemaConnector;
use crate::infrastructure::slack_client::SlackClient;
use crate::infrastructure::snapshot_retention::SnapshotJanitor;
use crate::infrastructure::teams_client::TeamsClient;
use crate::infrastructure::template_store::load_template_catalog;
use crate::infrastructure::tenant_lock::PgTenantLock;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, list_dashboards, trigger_pass};

fn set_or_not(value: &Option<String>) -> &'static str {
    if value.is_some() { "set" } else { "not set" }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config().context("Failed to load configuration")?;
    tracing::info!(
        grafana_url = config.grafana.base_url.as_deref().unwrap_or("per tenant"),
        grafana_api_key = set_or_not(&config.grafana.api_key),
        default_db_pass = set_or_not(&config.tenant_defaults.db_pass),
        capture_enabled = config.capture.enabled,
        "Configuration loaded"
    );

    // Templates are validated once, before anything runs
    let templates = Arc::new(load_template_catalog(&config.templates.dir)?);
    let rules = RuleSet::standard().context("Invalid classification rules")?;
    let renderer = TemplateRenderer::new().context("Invalid renderer patterns")?;

    // Create repositories (infrastructure layer)
    let pool = connect_admin_pool(&config.database).await?;
    let dashboards = PgDashboardRepository::new(pool.clone());
    dashboards.ensure_schema().await?;
    let repository = Arc::new(dashboards);
    let tenants = Arc::new(PgTenantDirectory::new(pool.clone()));

    // Create remote clients
    let grafana = Arc::new(GrafanaClient::new(Duration::from_secs(config.grafana.request_timeout_secs))?);
    let notify_timeout = Duration::from_secs(config.notifications.request_timeout_secs);
    let slack = Arc::new(SlackClient::new(&config.notifications.slack_api_base, notify_timeout)?);
    let teams = Arc::new(TeamsClient::new(notify_timeout)?);

    let mut capturer: Option<Arc<dyn SnapshotCapturer>> = None;
    let mut retention: Option<Arc<dyn SnapshotRetention>> = None;
    if config.capture.enabled {
        capturer = Some(Arc::new(BrowserCapturer::new(config.capture.clone())));
        retention = Some(Arc::new(SnapshotJanitor::new(
            config.capture.output_dir.clone(),
            config.capture.retention_days,
        )));
    }

    // Create services (application layer)
    let deps = PipelineDeps {
        credentials: Arc::new(PgCredentialStore::new(pool.clone())),
        lock: Arc::new(PgTenantLock::new(pool.clone())),
        connector: Arc::new(PgSchemaConnector::new(
            Duration::from_secs(config.database.acquire_timeout_secs),
            Duration::from_secs(config.database.statement_timeout_secs),
        )),
        datasources: grafana.clone(),
        repository: repository.clone(),
        publisher: DashboardPublisher::new(repository.clone(), grafana),
        capturer,
        dispatcher: NotificationDispatcher::new(
            repository.clone(),
            slack,
            teams,
            chrono::Duration::days(config.notifications.window_days),
        ),
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        deps,
        rules,
        templates,
        renderer,
        config.tenant_defaults(),
    ));

    let cancel = CancellationToken::new();

    // Periodic passes
    let scheduler = Scheduler::new(
        orchestrator.clone(),
        tenants.clone(),
        retention,
        Duration::from_secs(config.scheduler.interval_secs),
        config.scheduler.run_on_start,
    );
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    // Create application state
    let state = Arc::new(AppState {
        orchestrator,
        tenants,
        repository,
        cancel: cancel.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/tenants/:id/passes", post(trigger_pass))
        .route("/tenants/:id/dashboards", get(list_dashboards))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Ctrl-C stops the scheduler and drains the server
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Starting dashboard-provisioner on {}", addr);

    let server_cancel = cancel.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await?;

    if let Err(e) = scheduler_task.await {
        tracing::error!("Scheduler task ended abnormally: {}", e);
    }
    tracing::info!("Stopped");
    Ok(())
}
