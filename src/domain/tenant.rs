// Tenant domain model and per-tenant connection context
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::category::DatabaseCategory;
use super::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

/// A credential value that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Connection details for one of the tenant's databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub database: String,
    pub ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrafanaCredentials {
    pub base_url: String,
    pub api_key: Secret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDestination {
    pub bot_token: Secret,
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDestination {
    pub url: Secret,
}

/// Fallbacks applied when a tenant leaves database or Grafana settings unset.
#[derive(Debug, Clone, Default)]
pub struct TenantDefaults {
    pub db_port: u16,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub ssl: bool,
    pub grafana_url: Option<String>,
    pub grafana_api_key: Option<String>,
}

/// Everything the pipeline needs to act on behalf of a tenant.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_pass: Secret,
    pub ssl: bool,
    pub grafana: GrafanaCredentials,
    pub chat: Option<ChatDestination>,
    pub webhook: Option<WebhookDestination>,
    database_names: BTreeMap<DatabaseCategory, String>,
    datasource_uids: BTreeMap<DatabaseCategory, String>,
}

impl TenantContext {
    /// Builds the context from a credential lookup. Fails with
    /// `ConfigurationMissing` naming the first required key that is absent.
    pub fn from_credentials<F>(
        tenant: Tenant,
        defaults: &TenantDefaults,
        lookup: F,
    ) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let missing = |key: &str| PipelineError::ConfigurationMissing { key: key.to_string() };

        let db_host = get("DB_HOST").ok_or_else(|| missing("DB_HOST"))?;
        let db_port = match get("DB_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| PipelineError::ConfigurationMissing { key: "DB_PORT".to_string() })?,
            None => defaults.db_port,
        };
        let db_user = get("DB_USER")
            .or_else(|| defaults.db_user.clone())
            .ok_or_else(|| missing("DB_USER"))?;
        let db_pass = get("DB_PASS")
            .or_else(|| defaults.db_pass.clone())
            .ok_or_else(|| missing("DB_PASS"))?;
        let base_url = get("GRAFANA_URL")
            .or_else(|| defaults.grafana_url.clone())
            .ok_or_else(|| missing("GRAFANA_URL"))?;
        let api_key = get("GRAFANA_API_KEY")
            .or_else(|| defaults.grafana_api_key.clone())
            .ok_or_else(|| missing("GRAFANA_API_KEY"))?;

        let chat = match (get("SLACK_BOT_TOKEN"), get("SLACK_CHANNEL_ID")) {
            (Some(bot_token), Some(channel_id)) => Some(ChatDestination {
                bot_token: Secret::new(bot_token),
                channel_id,
            }),
            _ => None,
        };
        let webhook = get("TEAMS_WEBHOOK_URL").map(|url| WebhookDestination { url: Secret::new(url) });

        let mut database_names = BTreeMap::new();
        let mut datasource_uids = BTreeMap::new();
        for category in DatabaseCategory::ALL {
            if let Some(name) = get(category.database_name_key()) {
                database_names.insert(category, name);
            }
            if let Some(uid) = get(category.datasource_uid_key()) {
                datasource_uids.insert(category, uid);
            }
        }

        Ok(Self {
            tenant,
            db_host,
            db_port,
            db_user,
            db_pass: Secret::new(db_pass),
            ssl: defaults.ssl,
            grafana: GrafanaCredentials {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: Secret::new(api_key),
            },
            chat,
            webhook,
            database_names,
            datasource_uids,
        })
    }

    pub fn database_name(&self, category: DatabaseCategory) -> Option<&str> {
        self.database_names.get(&category).map(String::as_str)
    }

    pub fn pinned_datasource_uid(&self, category: DatabaseCategory) -> Option<&str> {
        self.datasource_uids.get(&category).map(String::as_str)
    }

    /// Connection target for a category, or `ConfigurationMissing` when the
    /// tenant has no database configured for it.
    pub fn database_target(&self, category: DatabaseCategory) -> Result<DatabaseTarget, PipelineError> {
        let database = self
            .database_name(category)
            .ok_or_else(|| PipelineError::ConfigurationMissing {
                key: category.database_name_key().to_string(),
            })?;

        Ok(DatabaseTarget {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_pass.clone(),
            database: database.to_string(),
            ssl: self.ssl,
        })
    }
}
