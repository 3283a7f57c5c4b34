// Database category domain model
use serde::{Deserialize, Serialize};
use std::fmt;

use super::classification::TemplateType;

/// One of the tenant databases the pipeline scans. Each category has its own
/// record store and its own subset of classification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseCategory {
    Timing,
    Qor,
    Drc,
    Reports,
}

impl DatabaseCategory {
    pub const ALL: [DatabaseCategory; 4] = [
        DatabaseCategory::Timing,
        DatabaseCategory::Qor,
        DatabaseCategory::Drc,
        DatabaseCategory::Reports,
    ];

    /// Credential holding the database name for this category.
    pub fn database_name_key(self) -> &'static str {
        match self {
            DatabaseCategory::Timing => "DB_NAME_TIMING_REPORT",
            DatabaseCategory::Qor => "DB_NAME_QOR",
            DatabaseCategory::Drc => "DB_NAME_DRC",
            DatabaseCategory::Reports => "DB_NAME_REPORTS",
        }
    }

    /// Credential that pins the datasource uid instead of looking it up.
    pub fn datasource_uid_key(self) -> &'static str {
        match self {
            DatabaseCategory::Timing => "GRAFANA_UID_TIMING_REPORT",
            DatabaseCategory::Qor => "GRAFANA_UID_QOR",
            DatabaseCategory::Drc => "GRAFANA_UID_DRC",
            DatabaseCategory::Reports => "GRAFANA_UID_REPORTS",
        }
    }

    /// Name of the persisted record store. Never derived from user input.
    pub fn record_table(self) -> &'static str {
        match self {
            DatabaseCategory::Timing => "dashboard_timing",
            DatabaseCategory::Qor => "dashboard_qor",
            DatabaseCategory::Drc => "dashboard_drc",
            DatabaseCategory::Reports => "dashboard_reports",
        }
    }

    pub fn templates(self) -> &'static [TemplateType] {
        match self {
            DatabaseCategory::Timing => &[
                TemplateType::DelayStack,
                TemplateType::Errors,
                TemplateType::Skew,
                TemplateType::DelayCompare,
                TemplateType::SlackCompare,
            ],
            DatabaseCategory::Qor => &[TemplateType::QorReport],
            DatabaseCategory::Drc => &[TemplateType::DrcReport],
            DatabaseCategory::Reports => &[
                TemplateType::Qor,
                TemplateType::DelayStack,
                TemplateType::Errors,
                TemplateType::Skew,
                TemplateType::DelayCompare,
                TemplateType::SlackCompare,
                TemplateType::RunCompare,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatabaseCategory::Timing => "timing",
            DatabaseCategory::Qor => "qor",
            DatabaseCategory::Drc => "drc",
            DatabaseCategory::Reports => "reports",
        }
    }
}

impl fmt::Display for DatabaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
