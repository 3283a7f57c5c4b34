// Pipeline orchestrator - one locked pass over a tenant's databases
use crate::application::classifier::TableClassifier;
use crate::application::dashboard_api::DatasourceDirectory;
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::application::publisher::{DashboardPublisher, PublishRequest};
use crate::application::renderer::TemplateRenderer;
use crate::application::resolver::PlaceholderResolver;
use crate::application::schema_inspector::{SchemaConnector, SchemaInspector};
use crate::application::snapshot_capturer::SnapshotCapturer;
use crate::application::template_catalog::TemplateCatalog;
use crate::application::tenant_directory::{CredentialStore, LockGuard, TenantLock};
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::{Classification, RuleSet};
use crate::domain::error::{FailureScope, PipelineError};
use crate::domain::tenant::{Tenant, TenantContext, TenantDefaults};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CategoryStatus {
    Completed,
    Skipped(String),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub category: DatabaseCategory,
    pub status: CategoryStatus,
    pub classified: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub ineligible: usize,
    pub failed: usize,
    pub snapshots: usize,
}

impl CategoryReport {
    fn new(category: DatabaseCategory, status: CategoryStatus) -> Self {
        Self {
            category,
            status,
            classified: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            ineligible: 0,
            failed: 0,
            snapshots: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub tenant_id: i64,
    pub categories: Vec<CategoryReport>,
    pub notifications: Option<DispatchReport>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another owner held the tenant lock; nothing was done.
    LockHeld,
}

/// Everything the orchestrator talks to.
pub struct PipelineDeps {
    pub credentials: Arc<dyn CredentialStore>,
    pub lock: Arc<dyn TenantLock>,
    pub connector: Arc<dyn SchemaConnector>,
    pub datasources: Arc<dyn DatasourceDirectory>,
    pub repository: Arc<dyn DashboardRepository>,
    pub publisher: DashboardPublisher,
    pub capturer: Option<Arc<dyn SnapshotCapturer>>,
    pub dispatcher: NotificationDispatcher,
}

pub struct PipelineOrchestrator {
    deps: PipelineDeps,
    rules: RuleSet,
    templates: Arc<TemplateCatalog>,
    resolver: PlaceholderResolver,
    renderer: TemplateRenderer,
    defaults: TenantDefaults,
}

enum ItemResult {
    Created { snapshot: bool },
    Updated { snapshot: bool },
    Unchanged,
    Ineligible,
}

impl PipelineOrchestrator {
    pub fn new(
        deps: PipelineDeps,
        rules: RuleSet,
        templates: Arc<TemplateCatalog>,
        renderer: TemplateRenderer,
        defaults: TenantDefaults,
    ) -> Self {
        Self { deps, rules, templates, resolver: PlaceholderResolver::new(), renderer, defaults }
    }

    /// Runs one pass for the tenant if its lock is free. The lock is released
    /// on every exit path, including when this future is dropped mid-pass.
    pub async fn run_pass(&self, tenant: &Tenant, cancel: &CancellationToken) -> Result<PassOutcome, PipelineError> {
        let Some(guard) = self.deps.lock.try_acquire(tenant.id).await? else {
            tracing::info!(tenant_id = %tenant.id, "Tenant lock held elsewhere, skipping pass");
            return Ok(PassOutcome::LockHeld);
        };
        let held = HeldLock { lock: self.deps.lock.clone(), guard: Some(guard) };

        let report = self.run_locked(tenant, cancel).await;

        held.release().await;
        Ok(PassOutcome::Completed(report))
    }

    async fn run_locked(&self, tenant: &Tenant, cancel: &CancellationToken) -> PassReport {
        let mut report = PassReport { tenant_id: tenant.id.0, categories: Vec::new(), notifications: None, cancelled: false };

        let credentials = match self.deps.credentials.get_all(tenant.id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant.id, "Cannot read credentials: {}", e);
                report.categories = every_category(CategoryStatus::Failed(e.to_string()));
                return report;
            }
        };
        let ctx = match TenantContext::from_credentials(tenant.clone(), &self.defaults, |key| credentials.get(key).cloned()) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::info!(tenant_id = %tenant.id, "Skipping every category: {}", e);
                report.categories = every_category(CategoryStatus::Skipped(e.to_string()));
                return report;
            }
        };
        tracing::debug!(
            tenant_id = %tenant.id,
            chat = if ctx.chat.is_some() { "set" } else { "not set" },
            webhook = if ctx.webhook.is_some() { "set" } else { "not set" },
            "Loaded tenant context"
        );

        for category in DatabaseCategory::ALL {
            let category_report = self.run_category(&ctx, category, cancel).await;
            report.categories.push(category_report);
        }

        // Stage boundary: notify
        if cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }
        report.notifications = Some(self.deps.dispatcher.dispatch(&ctx).await);
        report
    }

    async fn run_category(&self, ctx: &TenantContext, category: DatabaseCategory, cancel: &CancellationToken) -> CategoryReport {
        // Stage boundary: classify
        if cancel.is_cancelled() {
            return CategoryReport::new(category, CategoryStatus::Cancelled);
        }

        let target = match ctx.database_target(category) {
            Ok(target) => target,
            Err(e) => {
                tracing::info!(tenant_id = %ctx.tenant.id, %category, "Skipping category: {}", e);
                return CategoryReport::new(category, CategoryStatus::Skipped(e.to_string()));
            }
        };

        let schema = match self.deps.connector.connect(&target).await {
            Ok(schema) => schema,
            Err(e) => return category_failed(ctx, category, e),
        };
        let tables = match schema.list_tables().await {
            Ok(tables) => tables,
            Err(e) => return category_failed(ctx, category, e),
        };

        let outcome = TableClassifier::for_category(&self.rules, category).classify(&tables);
        if !outcome.misses.is_empty() {
            tracing::debug!(tenant_id = %ctx.tenant.id, %category, ignored = outcome.misses.len(), "Unclassified tables");
        }

        let mut report = CategoryReport::new(category, CategoryStatus::Completed);
        report.classified = outcome.classifications.len();
        if outcome.classifications.is_empty() {
            return report;
        }

        let datasource_uid = match self.datasource_uid(ctx, category, &target.database).await {
            Ok(uid) => uid,
            Err(e) => {
                let mut failed = category_failed(ctx, category, e);
                failed.classified = report.classified;
                return failed;
            }
        };

        for classification in &outcome.classifications {
            // Stage boundary: publish
            if cancel.is_cancelled() {
                report.status = CategoryStatus::Cancelled;
                break;
            }

            match self
                .process_item(ctx, category, classification, schema.as_ref(), &datasource_uid, cancel)
                .await
            {
                Ok(ItemResult::Created { snapshot }) => {
                    report.created += 1;
                    report.snapshots += usize::from(snapshot);
                }
                Ok(ItemResult::Updated { snapshot }) => {
                    report.updated += 1;
                    report.snapshots += usize::from(snapshot);
                }
                Ok(ItemResult::Unchanged) => report.unchanged += 1,
                Ok(ItemResult::Ineligible) => report.ineligible += 1,
                Err(e) if e.scope() == FailureScope::Category => {
                    let mut failed = category_failed(ctx, category, e);
                    failed.classified = report.classified;
                    return failed;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        tenant_id = %ctx.tenant.id,
                        %category,
                        key = %classification.key,
                        template = %classification.template,
                        "Dashboard failed: {}",
                        e
                    );
                }
            }
        }

        tracing::info!(
            tenant_id = %ctx.tenant.id,
            %category,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Category processed"
        );
        report
    }

    async fn process_item(
        &self,
        ctx: &TenantContext,
        category: DatabaseCategory,
        classification: &Classification,
        schema: &dyn SchemaInspector,
        datasource_uid: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemResult, PipelineError> {
        let Some(resolution) = self.resolver.resolve(classification, schema).await? else {
            tracing::debug!(key = %classification.key, "No dependent tables exist, skipping");
            return Ok(ItemResult::Ineligible);
        };

        let template = self.templates.get(classification.template)?;
        let dashboard = self.renderer.render(
            classification.template,
            template,
            &resolution.placeholders,
            Some(datasource_uid),
            Utc::now(),
        )?;

        let published = self
            .deps
            .publisher
            .publish(
                &ctx.grafana,
                PublishRequest {
                    tenant: &ctx.tenant,
                    category,
                    key: &classification.key,
                    dashboard: &dashboard,
                    dependencies: &resolution.dependencies,
                },
            )
            .await?;

        if !published.changed() {
            return Ok(ItemResult::Unchanged);
        }

        // Stage boundary: capture
        let snapshot = if cancel.is_cancelled() {
            false
        } else {
            self.capture(ctx, category, classification, &published.url).await
        };

        Ok(if published.created {
            ItemResult::Created { snapshot }
        } else {
            ItemResult::Updated { snapshot }
        })
    }

    /// Capture failures are logged and never fail the item.
    async fn capture(&self, ctx: &TenantContext, category: DatabaseCategory, classification: &Classification, url: &str) -> bool {
        let Some(capturer) = &self.deps.capturer else {
            return false;
        };

        let path = match capturer.capture(url, &ctx.grafana.api_key).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(key = %classification.key, "Continuing without snapshot: {}", e);
                return false;
            }
        };

        match self
            .deps
            .repository
            .set_snapshot(category, ctx.tenant.id, &classification.key, &path)
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %classification.key, %path, "Snapshot captured");
                true
            }
            Err(e) => {
                tracing::warn!(key = %classification.key, "Cannot record snapshot path: {}", e);
                false
            }
        }
    }

    async fn datasource_uid(&self, ctx: &TenantContext, category: DatabaseCategory, database: &str) -> Result<String, PipelineError> {
        if let Some(uid) = ctx.pinned_datasource_uid(category) {
            return Ok(uid.to_string());
        }

        if let Some(uid) = self.deps.datasources.find_by_name(&ctx.grafana, database).await? {
            return Ok(uid);
        }

        let target = ctx.database_target(category)?;
        let uid = self.deps.datasources.create_postgres(&ctx.grafana, &target).await?;
        tracing::info!(tenant_id = %ctx.tenant.id, %category, %uid, "Created datasource");
        Ok(uid)
    }
}

fn every_category(status: CategoryStatus) -> Vec<CategoryReport> {
    DatabaseCategory::ALL.iter().map(|c| CategoryReport::new(*c, status.clone())).collect()
}

/// A held tenant lock. Dropping it without `release` (a cancelled request,
/// an outer timeout) hands the release to a background task.
struct HeldLock {
    lock: Arc<dyn TenantLock>,
    guard: Option<LockGuard>,
}

impl HeldLock {
    async fn release(mut self) {
        if let Some(guard) = self.guard.take() {
            release_logged(self.lock.clone(), guard).await;
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else { return };
        tracing::warn!(tenant_id = %guard.tenant, "Pass dropped while holding the tenant lock, releasing");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_logged(self.lock.clone(), guard));
            }
            Err(_) => tracing::error!(tenant_id = %guard.tenant, "No runtime to release the tenant lock on"),
        }
    }
}

async fn release_logged(lock: Arc<dyn TenantLock>, guard: LockGuard) {
    let tenant = guard.tenant;
    if let Err(e) = lock.release(guard).await {
        tracing::error!(tenant_id = %tenant, "Failed to release tenant lock: {}", e);
    }
}

fn category_failed(ctx: &TenantContext, category: DatabaseCategory, err: PipelineError) -> CategoryReport {
    tracing::warn!(tenant_id = %ctx.tenant.id, %category, "Category aborted: {}", err);
    CategoryReport::new(category, CategoryStatus::Failed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::*;
    use crate::domain::classification::LogicalTableKey;
    use crate::domain::dashboard::DestinationKind;
    use crate::domain::tenant::TenantId;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Harness {
        repository: Arc<InMemoryRepository>,
        api: Arc<CountingDashboardApi>,
        datasources: Arc<FakeDatasources>,
        lock: Arc<InMemoryLock>,
        schemas: Arc<FakeConnector>,
        capturer: Arc<FakeCapturer>,
        chat: Arc<RecordingChat>,
        webhook: Arc<RecordingWebhook>,
        orchestrator: PipelineOrchestrator,
    }

    fn catalog() -> TemplateCatalog {
        let templates = crate::domain::classification::TemplateType::ALL
            .into_iter()
            .map(|t| {
                (
                    t,
                    json!({
                        "uid": "x",
                        "panels": [{
                            "datasource": { "uid": "${DATASOURCE_UID}" },
                            "targets": [{ "rawSql": format!("SELECT 1 /* {} */", t) }]
                        }]
                    }),
                )
            })
            .collect::<BTreeMap<_, _>>();
        TemplateCatalog::new(templates)
    }

    fn harness(credentials: FakeCredentials, capture_fails: bool) -> Harness {
        let repository = Arc::new(InMemoryRepository::default());
        let api = Arc::new(CountingDashboardApi::default());
        let datasources = Arc::new(FakeDatasources::default());
        let lock = Arc::new(InMemoryLock::default());
        let schemas = Arc::new(FakeConnector::default());
        let capturer = Arc::new(FakeCapturer::new(capture_fails));
        let chat = Arc::new(RecordingChat::default());
        let webhook = Arc::new(RecordingWebhook::default());

        let deps = PipelineDeps {
            credentials: Arc::new(credentials),
            lock: lock.clone(),
            connector: schemas.clone(),
            datasources: datasources.clone(),
            repository: repository.clone(),
            publisher: DashboardPublisher::new(repository.clone(), api.clone()),
            capturer: Some(capturer.clone()),
            dispatcher: NotificationDispatcher::new(repository.clone(), chat.clone(), webhook.clone(), chrono::Duration::days(7)),
        };
        let orchestrator = PipelineOrchestrator::new(
            deps,
            RuleSet::standard().unwrap(),
            Arc::new(catalog()),
            TemplateRenderer::new().unwrap(),
            TenantDefaults { db_port: 5432, ..TenantDefaults::default() },
        );

        Harness { repository, api, datasources, lock, schemas, capturer, chat, webhook, orchestrator }
    }

    fn full_credentials() -> FakeCredentials {
        FakeCredentials::new(&[
            ("DB_HOST", "db"),
            ("DB_USER", "u"),
            ("DB_PASS", "p"),
            ("GRAFANA_URL", "http://grafana"),
            ("GRAFANA_API_KEY", "key"),
            ("SLACK_BOT_TOKEN", "xoxb"),
            ("SLACK_CHANNEL_ID", "C1"),
            ("TEAMS_WEBHOOK_URL", "http://teams"),
            ("DB_NAME_REPORTS", "reports_db"),
            ("DB_NAME_TIMING_REPORT", "timing_db"),
        ])
    }

    fn tenant() -> Tenant {
        Tenant { id: TenantId(1), name: "alice".into() }
    }

    fn completed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Completed(report) => report,
            PassOutcome::LockHeld => panic!("pass was skipped"),
        }
    }

    fn category<'a>(report: &'a PassReport, category: DatabaseCategory) -> &'a CategoryReport {
        report.categories.iter().find(|c| c.category == category).unwrap()
    }

    #[tokio::test]
    async fn test_block_with_missing_slot_creates_one_record() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["foo_grafana_pd", "foo_pathgroups_pd"]);

        let report = completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());

        let reports = category(&report, DatabaseCategory::Reports);
        assert_eq!(reports.status, CategoryStatus::Completed);
        assert_eq!(reports.created, 1);
        assert_eq!(h.api.creates(), 1);

        let record = h
            .repository
            .find(DatabaseCategory::Reports, TenantId(1), &LogicalTableKey::new("foo_grafana_pd"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.dependencies.is_present("{{DRC_TABLE}}"), Some(false));
        assert!(record.snapshot_path.is_some());

        // the datasource was looked up by name, not found, and created once
        assert_eq!(h.datasources.created(), vec!["reports_db".to_string()]);
        assert_eq!(report.notifications.as_ref().unwrap().sent, 2);
        assert!(!h.lock.is_held(TenantId(1)));
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent_until_slot_appears() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["run1_cts"]);
        let cancel = CancellationToken::new();

        completed(h.orchestrator.run_pass(&tenant(), &cancel).await.unwrap());
        let second = completed(h.orchestrator.run_pass(&tenant(), &cancel).await.unwrap());
        assert_eq!(category(&second, DatabaseCategory::Reports).unchanged, 2);
        assert_eq!(h.api.creates(), 2);
        assert_eq!(h.api.updates(), 0);
        assert_eq!(h.capturer.calls(), 2);

        h.schemas.set_tables("reports_db", &["run1_cts", "run1_route"]);
        let third = completed(h.orchestrator.run_pass(&tenant(), &cancel).await.unwrap());
        assert_eq!(category(&third, DatabaseCategory::Reports).updated, 2);
        assert_eq!(h.api.updates(), 2);
        assert_eq!(h.repository.count(), 2);

        // notifications went out once per record and destination
        assert_eq!(h.chat.links(), 2);
        assert_eq!(h.webhook.attempts(), 2);
    }

    #[tokio::test]
    async fn test_run_slots_create_two_independent_records() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["run1_cts", "run1_route"]);

        completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());

        let keys: Vec<String> = h
            .repository
            .list_for_tenant(DatabaseCategory::Reports, TenantId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.logical_key.to_string())
            .collect();
        assert_eq!(keys, vec!["run1-compare-delay".to_string(), "run1-compare-slack".to_string()]);
    }

    #[tokio::test]
    async fn test_lock_held_skips_pass() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["clk_skew"]);
        let guard: LockGuard = h.lock.try_acquire(TenantId(1)).await.unwrap().unwrap();

        let outcome = h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, PassOutcome::LockHeld);
        assert_eq!(h.api.creates(), 0);

        h.lock.release(guard).await.unwrap();
        completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());
        assert_eq!(h.api.creates(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_only_that_category() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["clk_skew"]);
        h.schemas.refuse("timing_db");

        let report = completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());

        assert!(matches!(category(&report, DatabaseCategory::Timing).status, CategoryStatus::Failed(_)));
        assert!(matches!(category(&report, DatabaseCategory::Qor).status, CategoryStatus::Skipped(_)));
        assert_eq!(category(&report, DatabaseCategory::Reports).created, 1);
        assert!(!h.lock.is_held(TenantId(1)));
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_siblings() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["a_skew", "b_skew", "c_skew"]);
        h.api.fail_for_uid(&crate::application::renderer::dedupable_uid(
            crate::domain::classification::TemplateType::Skew,
            "skew-b_skew",
        ));

        let report = completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());
        let reports = category(&report, DatabaseCategory::Reports);
        assert_eq!(reports.created, 2);
        assert_eq!(reports.failed, 1);
        assert_eq!(h.repository.count(), 2);
    }

    #[tokio::test]
    async fn test_capture_failure_is_not_fatal() {
        let h = harness(full_credentials(), true);
        h.schemas.set_tables("reports_db", &["clk_skew"]);

        let report = completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());
        let reports = category(&report, DatabaseCategory::Reports);
        assert_eq!(reports.created, 1);
        assert_eq!(reports.snapshots, 0);

        let record = h
            .repository
            .find(DatabaseCategory::Reports, TenantId(1), &LogicalTableKey::new("clk_skew"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.snapshot_path.is_none());
        assert!(record.sent_at.is_sent(DestinationKind::Chat));
    }

    #[tokio::test]
    async fn test_missing_global_credentials_skip_every_category() {
        let h = harness(FakeCredentials::new(&[("GRAFANA_URL", "http://g")]), false);

        let report = completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());
        assert_eq!(report.categories.len(), DatabaseCategory::ALL.len());
        assert!(report.categories.iter().all(|c| matches!(c.status, CategoryStatus::Skipped(_))));
        assert!(report.notifications.is_none());
        assert!(!h.lock.is_held(TenantId(1)));
    }

    #[tokio::test]
    async fn test_credential_store_failure_fails_every_category() {
        let h = harness(FakeCredentials::failing(), false);

        let outcome = h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await;
        let report = completed(outcome.unwrap());
        assert_eq!(report.categories.len(), DatabaseCategory::ALL.len());
        assert!(report.categories.iter().all(|c| matches!(&c.status, CategoryStatus::Failed(reason) if reason.contains("credentials table"))));
        assert!(report.notifications.is_none());
        assert!(!h.lock.is_held(TenantId(1)));
    }

    #[tokio::test]
    async fn test_dropped_pass_frees_the_tenant_lock() {
        let pairs = [
            ("DB_HOST", "db"),
            ("DB_USER", "u"),
            ("DB_PASS", "p"),
            ("GRAFANA_URL", "http://g"),
            ("GRAFANA_API_KEY", "k"),
            ("DB_NAME_REPORTS", "reports_db"),
        ];
        let h = harness(FakeCredentials::hanging_once(&pairs), false);
        h.schemas.set_tables("reports_db", &["clk_skew"]);
        let cancel = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            h.orchestrator.run_pass(&tenant(), &cancel),
        )
        .await;
        assert!(timed_out.is_err());

        // release runs on a spawned task
        for _ in 0..100 {
            if !h.lock.is_held(TenantId(1)) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!h.lock.is_held(TenantId(1)));

        let outcome = h.orchestrator.run_pass(&tenant(), &cancel).await.unwrap();
        assert!(matches!(outcome, PassOutcome::Completed(_)));
        assert_eq!(h.api.creates(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_pass_starts_no_stage() {
        let h = harness(full_credentials(), false);
        h.schemas.set_tables("reports_db", &["clk_skew"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = completed(h.orchestrator.run_pass(&tenant(), &cancel).await.unwrap());
        assert!(report.cancelled);
        assert!(report.categories.iter().all(|c| c.status == CategoryStatus::Cancelled));
        assert_eq!(h.api.creates(), 0);
        assert_eq!(h.chat.links(), 0);
        assert!(!h.lock.is_held(TenantId(1)));
    }

    #[tokio::test]
    async fn test_pinned_datasource_skips_directory() {
        let mut creds = full_credentials();
        creds.insert("GRAFANA_UID_REPORTS", "pinned-uid");
        let h = harness(creds, false);
        h.schemas.set_tables("reports_db", &["clk_skew"]);

        completed(h.orchestrator.run_pass(&tenant(), &CancellationToken::new()).await.unwrap());
        assert!(h.datasources.created().is_empty());
        assert!(h.api.last_definition().unwrap().to_string().contains("pinned-uid"));
    }
}
