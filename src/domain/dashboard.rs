// Dashboard domain models - rendered definitions and persisted records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::category::DatabaseCategory;
use super::classification::{LogicalTableKey, TemplateType};
use super::placeholder::DependencyState;
use super::tenant::TenantId;

/// A dashboard definition ready to be sent to the dashboard service.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDashboard {
    pub uid: String,
    pub title: String,
    pub template: TemplateType,
    pub definition: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Chat,
    Webhook,
}

impl DestinationKind {
    pub const ALL: [DestinationKind; 2] = [DestinationKind::Chat, DestinationKind::Webhook];

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Chat => "chat",
            DestinationKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination kind -> time the notification was confirmed. Absent means unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentState(BTreeMap<DestinationKind, DateTime<Utc>>);

impl SentState {
    pub fn sent_at(&self, kind: DestinationKind) -> Option<DateTime<Utc>> {
        self.0.get(&kind).copied()
    }

    pub fn is_sent(&self, kind: DestinationKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn mark(&mut self, kind: DestinationKind, at: DateTime<Utc>) {
        self.0.insert(kind, at);
    }

    pub fn any_unset(&self, kinds: &[DestinationKind]) -> bool {
        kinds.iter().any(|k| !self.is_sent(*k))
    }
}

/// Persisted record of a published dashboard, unique on (tenant, category, key).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRecord {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub category: DatabaseCategory,
    pub logical_key: LogicalTableKey,
    pub template: TemplateType,
    pub remote_url: String,
    pub snapshot_path: Option<String>,
    pub dependencies: DependencyState,
    pub sent_at: SentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a record for the first time.
#[derive(Debug, Clone)]
pub struct NewDashboardRecord {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub category: DatabaseCategory,
    pub logical_key: LogicalTableKey,
    pub template: TemplateType,
    pub remote_url: String,
    pub dependencies: DependencyState,
}

impl NewDashboardRecord {
    pub fn into_record(self, now: DateTime<Utc>) -> DashboardRecord {
        DashboardRecord {
            tenant_id: self.tenant_id,
            tenant_name: self.tenant_name,
            category: self.category,
            logical_key: self.logical_key,
            template: self.template,
            remote_url: self.remote_url,
            snapshot_path: None,
            dependencies: self.dependencies,
            sent_at: SentState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
