// In-memory port implementations for use case tests
use crate::application::dashboard_api::{DashboardApi, DatasourceDirectory};
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::dispatcher::NotificationDispatcher;
use crate::application::notifier::{ChatNotifier, DashboardNotice, WebhookNotifier};
use crate::application::orchestrator::{PipelineDeps, PipelineOrchestrator};
use crate::application::publisher::DashboardPublisher;
use crate::application::renderer::TemplateRenderer;
use crate::application::schema_inspector::{SchemaConnector, SchemaInspector};
use crate::application::snapshot_capturer::{SnapshotCapturer, SnapshotRetention};
use crate::application::template_catalog::TemplateCatalog;
use crate::application::tenant_directory::{CredentialStore, LockGuard, TenantDirectory, TenantLock};
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::{LogicalTableKey, RuleSet};
use crate::domain::dashboard::{DashboardRecord, DestinationKind, RenderedDashboard};
use crate::domain::error::PipelineError;
use crate::domain::placeholder::DependencyState;
use crate::domain::tenant::{
    ChatDestination, DatabaseTarget, GrafanaCredentials, Secret, Tenant, TenantContext, TenantDefaults, TenantId,
    WebhookDestination,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct FakeSchema {
    tables: BTreeSet<String>,
}

impl FakeSchema {
    pub fn with_tables(tables: &[&str]) -> Self {
        Self { tables: tables.iter().map(|t| t.to_string()).collect() }
    }
}

#[async_trait]
impl SchemaInspector for FakeSchema {
    async fn list_tables(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.tables.iter().cloned().collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, PipelineError> {
        Ok(self.tables.contains(table))
    }
}

#[derive(Default)]
pub struct FakeConnector {
    databases: Mutex<HashMap<String, Vec<String>>>,
    refused: Mutex<BTreeSet<String>>,
}

impl FakeConnector {
    pub fn set_tables(&self, database: &str, tables: &[&str]) {
        self.databases
            .lock()
            .unwrap()
            .insert(database.to_string(), tables.iter().map(|t| t.to_string()).collect());
    }

    pub fn refuse(&self, database: &str) {
        self.refused.lock().unwrap().insert(database.to_string());
    }
}

#[async_trait]
impl SchemaConnector for FakeConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn SchemaInspector>, PipelineError> {
        if self.refused.lock().unwrap().contains(&target.database) {
            return Err(PipelineError::ConnectionFailure {
                database: target.database.clone(),
                reason: "connection refused".into(),
            });
        }
        let tables = self.databases.lock().unwrap().get(&target.database).cloned().unwrap_or_default();
        let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
        Ok(Box::new(FakeSchema::with_tables(&tables)))
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    records: Mutex<Vec<DashboardRecord>>,
}

impl InMemoryRepository {
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn with_record<T>(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        f: impl FnOnce(&mut DashboardRecord) -> T,
    ) -> Result<T, PipelineError> {
        let mut records = self.records.lock().unwrap();
        records
            .iter_mut()
            .find(|r| r.category == category && r.tenant_id == tenant && &r.logical_key == key)
            .map(f)
            .ok_or_else(|| PipelineError::Storage(format!("no record for {key}")))
    }
}

#[async_trait]
impl DashboardRepository for InMemoryRepository {
    async fn find(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
    ) -> Result<Option<DashboardRecord>, PipelineError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.category == category && r.tenant_id == tenant && &r.logical_key == key)
            .cloned())
    }

    async fn insert(&self, record: &DashboardRecord) -> Result<(), PipelineError> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| {
            r.category == record.category && r.tenant_id == record.tenant_id && r.logical_key == record.logical_key
        }) {
            return Err(PipelineError::Storage("duplicate key".into()));
        }
        records.push(record.clone());
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
        self.with_record(category, tenant, key, |r| {
            r.remote_url = remote_url.to_string();
            r.dependencies = dependencies.clone();
            r.updated_at = Utc::now();
        })
    }

    async fn set_snapshot(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        path: &str,
    ) -> Result<(), PipelineError> {
        self.with_record(category, tenant, key, |r| r.snapshot_path = Some(path.to_string()))
    }

    async fn pending_notifications(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        kinds: &[DestinationKind],
        since: DateTime<Utc>,
    ) -> Result<Vec<DashboardRecord>, PipelineError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.category == category && r.tenant_id == tenant)
            .filter(|r| r.created_at >= since && r.sent_at.any_unset(kinds))
            .cloned()
            .collect())
    }

    async fn mark_sent(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
        key: &LogicalTableKey,
        kind: DestinationKind,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.with_record(category, tenant, key, |r| r.sent_at.mark(kind, at))
    }

    async fn list_for_tenant(
        &self,
        category: DatabaseCategory,
        tenant: TenantId,
    ) -> Result<Vec<DashboardRecord>, PipelineError> {
        let mut found: Vec<DashboardRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.category == category && r.tenant_id == tenant)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.logical_key.cmp(&b.logical_key));
        Ok(found)
    }
}

#[derive(Default)]
pub struct CountingDashboardApi {
    creates: AtomicUsize,
    updates: AtomicUsize,
    fail_all: bool,
    failing_uids: Mutex<BTreeSet<String>>,
    next_url: Mutex<Option<String>>,
    last_definition: Mutex<Option<serde_json::Value>>,
}

impl CountingDashboardApi {
    pub fn failing() -> Self {
        Self { fail_all: true, ..Self::default() }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn set_next_url(&self, url: &str) {
        *self.next_url.lock().unwrap() = Some(url.to_string());
    }

    pub fn fail_for_uid(&self, uid: &str) {
        self.failing_uids.lock().unwrap().insert(uid.to_string());
    }

    pub fn last_definition(&self) -> Option<serde_json::Value> {
        self.last_definition.lock().unwrap().clone()
    }

    fn respond(&self, grafana: &GrafanaCredentials, dashboard: &RenderedDashboard) -> Result<String, PipelineError> {
        if self.fail_all || self.failing_uids.lock().unwrap().contains(&dashboard.uid) {
            return Err(PipelineError::remote("create dashboard", "HTTP 500"));
        }
        *self.last_definition.lock().unwrap() = Some(dashboard.definition.clone());
        Ok(self
            .next_url
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| format!("{}/d/{}", grafana.base_url, dashboard.uid)))
    }
}

#[async_trait]
impl DashboardApi for CountingDashboardApi {
    async fn create_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.respond(grafana, dashboard)
    }

    async fn update_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.respond(grafana, dashboard)
    }
}

#[derive(Default)]
pub struct FakeDatasources {
    created: Mutex<Vec<String>>,
}

impl FakeDatasources {
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasourceDirectory for FakeDatasources {
    async fn find_by_name(&self, _grafana: &GrafanaCredentials, name: &str) -> Result<Option<String>, PipelineError> {
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.as_str() == name)
            .map(|n| format!("ds-{n}")))
    }

    async fn create_postgres(&self, _grafana: &GrafanaCredentials, target: &DatabaseTarget) -> Result<String, PipelineError> {
        self.created.lock().unwrap().push(target.database.clone());
        Ok(format!("ds-{}", target.database))
    }
}

#[derive(Default)]
pub struct InMemoryLock {
    held: Mutex<HashMap<TenantId, Uuid>>,
}

impl InMemoryLock {
    pub fn is_held(&self, tenant: TenantId) -> bool {
        self.held.lock().unwrap().contains_key(&tenant)
    }
}

#[async_trait]
impl TenantLock for InMemoryLock {
    async fn try_acquire(&self, tenant: TenantId) -> Result<Option<LockGuard>, PipelineError> {
        let mut held = self.held.lock().unwrap();
        if held.contains_key(&tenant) {
            return Ok(None);
        }
        let owner = Uuid::new_v4();
        held.insert(tenant, owner);
        Ok(Some(LockGuard { tenant, owner }))
    }

    async fn release(&self, guard: LockGuard) -> Result<(), PipelineError> {
        let mut held = self.held.lock().unwrap();
        match held.get(&guard.tenant) {
            Some(owner) if *owner == guard.owner => {
                held.remove(&guard.tenant);
                Ok(())
            }
            _ => Err(PipelineError::Storage("lock not held by this owner".into())),
        }
    }
}

pub struct FakeCapturer {
    fails: bool,
    calls: AtomicUsize,
}

impl FakeCapturer {
    pub fn new(fails: bool) -> Self {
        Self { fails, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotCapturer for FakeCapturer {
    async fn capture(&self, _dashboard_url: &str, _auth_token: &Secret) -> Result<PathBuf, PipelineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(PipelineError::Capture("navigation timed out".into()));
        }
        Ok(PathBuf::from(format!("/nonexistent/gif_captures/dashboard_{n}.gif")))
    }
}

#[derive(Default)]
pub struct RecordingChat {
    links: AtomicUsize,
    uploads: AtomicUsize,
    fail_uploads: bool,
}

impl RecordingChat {
    pub fn failing_uploads() -> Self {
        Self { fail_uploads: true, ..Self::default() }
    }

    pub fn links(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn post_link(&self, _destination: &ChatDestination, _notice: &DashboardNotice) -> Result<(), PipelineError> {
        self.links.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_snapshot(
        &self,
        _destination: &ChatDestination,
        _notice: &DashboardNotice,
        _snapshot: &Path,
    ) -> Result<(), PipelineError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            return Err(PipelineError::Notification { destination: "chat", reason: "upload rejected".into() });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingWebhook {
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingWebhook {
    pub fn failing() -> Self {
        Self { attempts: AtomicUsize::new(0), failing: AtomicBool::new(true) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookNotifier for RecordingWebhook {
    async fn post_card(&self, _destination: &WebhookDestination, _notice: &DashboardNotice) -> Result<(), PipelineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::Notification { destination: "webhook", reason: "HTTP 502".into() });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeCredentials {
    values: HashMap<String, String>,
    fails: bool,
    hang_once: Arc<AtomicBool>,
}

impl FakeCredentials {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self { fails: true, ..Self::default() }
    }

    /// The first `get_all` never completes; later calls answer normally.
    pub fn hanging_once(pairs: &[(&str, &str)]) -> Self {
        Self { hang_once: Arc::new(AtomicBool::new(true)), ..Self::new(pairs) }
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn get_all(&self, _tenant: TenantId) -> Result<HashMap<String, String>, PipelineError> {
        if self.hang_once.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fails {
            return Err(PipelineError::Storage("credentials table unavailable".into()));
        }
        Ok(self.values.clone())
    }
}

pub struct FakeTenants {
    tenants: Vec<Tenant>,
}

impl FakeTenants {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self { tenants }
    }
}

#[async_trait]
impl TenantDirectory for FakeTenants {
    async fn active_tenants(&self) -> Result<Vec<Tenant>, PipelineError> {
        Ok(self.tenants.clone())
    }

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, PipelineError> {
        Ok(self.tenants.iter().find(|t| t.id == id).cloned())
    }
}

#[derive(Default)]
pub struct CountingRetention {
    sweeps: AtomicUsize,
}

impl CountingRetention {
    pub fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotRetention for CountingRetention {
    async fn sweep(&self) -> Result<usize, PipelineError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Tenant 1 ("alice") with the requested destinations configured.
pub fn tenant_context(chat: bool, webhook: bool) -> TenantContext {
    let mut values = vec![("DB_HOST", "db"), ("GRAFANA_URL", "http://grafana"), ("GRAFANA_API_KEY", "key")];
    if chat {
        values.push(("SLACK_BOT_TOKEN", "xoxb"));
        values.push(("SLACK_CHANNEL_ID", "C1"));
    }
    if webhook {
        values.push(("TEAMS_WEBHOOK_URL", "http://teams"));
    }
    let map: HashMap<String, String> = values.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let defaults = TenantDefaults {
        db_port: 5432,
        db_user: Some("u".into()),
        db_pass: Some("p".into()),
        ..TenantDefaults::default()
    };
    let tenant = Tenant { id: TenantId(1), name: "alice".into() };
    match TenantContext::from_credentials(tenant, &defaults, |k| map.get(k).cloned()) {
        Ok(ctx) => ctx,
        Err(e) => panic!("test context: {e}"),
    }
}

/// An orchestrator whose tenants have no databases configured, plus its lock.
pub fn orchestrator_for_tests() -> (PipelineOrchestrator, Arc<InMemoryLock>) {
    let repository = Arc::new(InMemoryRepository::default());
    let api = Arc::new(CountingDashboardApi::default());
    let lock = Arc::new(InMemoryLock::default());
    let deps = PipelineDeps {
        credentials: Arc::new(FakeCredentials::new(&[
            ("DB_HOST", "db"),
            ("DB_USER", "u"),
            ("DB_PASS", "p"),
            ("GRAFANA_URL", "http://grafana"),
            ("GRAFANA_API_KEY", "key"),
        ])),
        lock: lock.clone(),
        connector: Arc::new(FakeConnector::default()),
        datasources: Arc::new(FakeDatasources::default()),
        repository: repository.clone(),
        publisher: DashboardPublisher::new(repository.clone(), api),
        capturer: None,
        dispatcher: NotificationDispatcher::new(
            repository,
            Arc::new(RecordingChat::default()),
            Arc::new(RecordingWebhook::default()),
            chrono::Duration::days(7),
        ),
    };
    let orchestrator = PipelineOrchestrator::new(
        deps,
        RuleSet::standard().unwrap(),
        Arc::new(TemplateCatalog::default()),
        TemplateRenderer::new().unwrap(),
        TenantDefaults::default(),
    );
    (orchestrator, lock)
}
