// Service configuration - config/app file layered with PROVISIONER__* environment variables
use crate::domain::tenant::TenantDefaults;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub tenant_defaults: TenantDefaultSettings,
    #[serde(default)]
    pub grafana: GrafanaSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub templates: TemplateSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

/// Admin database holding tenants, credentials and dashboard records.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Server-side limit on each tenant schema query.
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_statement_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TenantDefaultSettings {
    pub db_port: u16,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub ssl: bool,
}

impl Default for TenantDefaultSettings {
    fn default() -> Self {
        Self { db_port: 5432, db_user: None, db_pass: None, ssl: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GrafanaSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for GrafanaSettings {
    fn default() -> Self {
        Self { base_url: None, api_key: None, request_timeout_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationSettings {
    pub slack_api_base: String,
    pub request_timeout_secs: u64,
    /// Records older than this many days are no longer retried.
    pub window_days: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            slack_api_base: "https://slack.com/api".to_string(),
            request_timeout_secs: 30,
            window_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureSettings {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub frame_delay_ms: u64,
    pub scroll_distance: u32,
    pub scroll_interval_ms: u64,
    pub max_scroll_steps: u32,
    pub navigation_timeout_secs: u64,
    pub retention_days: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("gif_captures"),
            width: 1920,
            height: 1080,
            frames: 10,
            frame_delay_ms: 500,
            scroll_distance: 100,
            scroll_interval_ms: 500,
            max_scroll_steps: 200,
            navigation_timeout_secs: 120,
            retention_days: 14,
        }
    }
}

impl CaptureSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub run_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { interval_secs: 300, run_on_start: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TemplateSettings {
    pub dir: PathBuf,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from("templates") }
    }
}

impl AppConfig {
    pub fn tenant_defaults(&self) -> TenantDefaults {
        TenantDefaults {
            db_port: self.tenant_defaults.db_port,
            db_user: self.tenant_defaults.db_user.clone(),
            db_pass: self.tenant_defaults.db_pass.clone(),
            ssl: self.tenant_defaults.ssl,
            grafana_url: self.grafana.base_url.clone(),
            grafana_api_key: self.grafana.api_key.clone(),
        }
    }
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/app").required(false))
        .add_source(config::Environment::with_prefix("PROVISIONER").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
