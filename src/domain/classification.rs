// Classification rules - ordered table-name patterns mapped to dashboard templates
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    Qor,
    DelayStack,
    Errors,
    Skew,
    DelayCompare,
    SlackCompare,
    RunCompare,
    QorReport,
    DrcReport,
}

impl TemplateType {
    pub const ALL: [TemplateType; 9] = [
        TemplateType::Qor,
        TemplateType::DelayStack,
        TemplateType::Errors,
        TemplateType::Skew,
        TemplateType::DelayCompare,
        TemplateType::SlackCompare,
        TemplateType::RunCompare,
        TemplateType::QorReport,
        TemplateType::DrcReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateType::Qor => "qor",
            TemplateType::DelayStack => "delay-stack",
            TemplateType::Errors => "errors",
            TemplateType::Skew => "skew",
            TemplateType::DelayCompare => "delay-compare",
            TemplateType::SlackCompare => "slack-compare",
            TemplateType::RunCompare => "run-compare",
            TemplateType::QorReport => "qor-report",
            TemplateType::DrcReport => "drc-report",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            TemplateType::Qor => "qor_pnr.json",
            TemplateType::DelayStack => "delay_stacking.json",
            TemplateType::Errors => "errors.json",
            TemplateType::Skew => "skew.json",
            TemplateType::DelayCompare => "delay_comparison.json",
            TemplateType::SlackCompare => "slack_comparison.json",
            TemplateType::RunCompare => "run_comparison.json",
            TemplateType::QorReport => "qor_report.json",
            TemplateType::DrcReport => "drc_report.json",
        }
    }

    /// Dedupable templates get a uid derived from the classification
    /// identifier, so re-publishing overwrites the same remote dashboard.
    pub fn is_dedupable(self) -> bool {
        !matches!(self, TemplateType::QorReport | TemplateType::DrcReport)
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable name of a dashboard's subject: a raw table name or a derived group key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTableKey(String);

impl LogicalTableKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalTableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a multi-table rule groups the tables its patterns match.
///
/// Every pattern of a group rule exposes named captures:
/// - `Block`: `key`, optional `suffix`; pattern index `i` fills `slots[i]`.
/// - `RunSlots`: `prefix`, `slot`, `run`, optional `suffix`.
/// - `RunPairs`: `run`, `gen`, optional `suffix`; `run` must equal `gen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSchema {
    Block { slots: &'static [&'static str] },
    RunSlots { slots: &'static [&'static str] },
    RunPairs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    SingleTable,
    Group(SlotSchema),
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub template: TemplateType,
    /// Lower value wins.
    pub priority: u32,
    pub patterns: Vec<Regex>,
    pub arity: Arity,
}

impl ClassificationRule {
    pub fn new(
        template: TemplateType,
        priority: u32,
        patterns: &[&str],
        arity: Arity,
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { template, priority, patterns, arity })
    }

    /// Alternatives within a rule are OR'd.
    pub fn matches(&self, table: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(table))
    }

    /// Index of the first pattern matching `table`.
    pub fn matching_pattern(&self, table: &str) -> Option<(usize, &Regex)> {
        self.patterns.iter().enumerate().find(|(_, p)| p.is_match(table))
    }

    /// Rules sharing a slot schema produce one dashboard each for the same group.
    pub fn same_family(&self, other: &ClassificationRule) -> bool {
        match (&self.arity, &other.arity) {
            (Arity::Group(a), Arity::Group(b)) => a == b,
            _ => false,
        }
    }
}

pub const QOR_BLOCK_SLOTS: &[&str] = &["grafana", "pathgroups", "violations"];
pub const CTS_ROUTE_SLOTS: &[&str] = &["cts", "route"];

/// Immutable, priority-sorted set of classification rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<ClassificationRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn standard() -> Result<Self, regex::Error> {
        let cts_route = [
            r"^(?P<prefix>.*)_(?P<slot>cts|route)(?P<run>\d+)(?P<suffix>_csv)?$",
            r"^(?P<prefix>.*?)(?P<run>\d+)_(?P<slot>cts|route)(?P<suffix>_csv)?$",
        ];

        Ok(Self::new(vec![
            ClassificationRule::new(
                TemplateType::Qor,
                0,
                &[
                    r"^(?P<key>.*)_grafana_pd(?P<suffix>_csv)?$",
                    r"^(?P<key>.*)_pathgroups_pd(?P<suffix>_csv)?$",
                    r"^(?P<key>.*)_violations_pd(?P<suffix>_csv)?$",
                ],
                Arity::Group(SlotSchema::Block { slots: QOR_BLOCK_SLOTS }),
            )?,
            ClassificationRule::new(
                TemplateType::DelayStack,
                1,
                &[r"(early_|late_)?(.*(in2reg|in2out|reg2out|reg2mem))"],
                Arity::SingleTable,
            )?,
            ClassificationRule::new(TemplateType::Errors, 2, &["error"], Arity::SingleTable)?,
            ClassificationRule::new(TemplateType::Skew, 3, &["skew"], Arity::SingleTable)?,
            ClassificationRule::new(
                TemplateType::DelayCompare,
                4,
                &cts_route,
                Arity::Group(SlotSchema::RunSlots { slots: CTS_ROUTE_SLOTS }),
            )?,
            ClassificationRule::new(
                TemplateType::SlackCompare,
                5,
                &cts_route,
                Arity::Group(SlotSchema::RunSlots { slots: CTS_ROUTE_SLOTS }),
            )?,
            ClassificationRule::new(
                TemplateType::RunCompare,
                6,
                &[r"^run(?P<run>\d+)_g(?P<gen>\d+)(?P<suffix>_csv)?$"],
                Arity::Group(SlotSchema::RunPairs),
            )?,
            ClassificationRule::new(TemplateType::QorReport, 10, &[r"^.+$"], Arity::SingleTable)?,
            ClassificationRule::new(TemplateType::DrcReport, 11, &[r"^.+$"], Arity::SingleTable)?,
        ]))
    }

    /// The subset of rules that apply to the given templates, still priority-sorted.
    pub fn restricted_to(&self, templates: &[TemplateType]) -> RuleSet {
        RuleSet {
            rules: self
                .rules
                .iter()
                .filter(|r| templates.contains(&r.template))
                .cloned()
                .collect(),
        }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// The lowest-priority-valued rule whose patterns match `table`.
    pub fn select(&self, table: &str) -> Option<&ClassificationRule> {
        self.rules.iter().find(|r| r.matches(table))
    }

    pub fn family_of<'a>(&'a self, rule: &'a ClassificationRule) -> impl Iterator<Item = &'a ClassificationRule> {
        self.rules
            .iter()
            .filter(move |r| r.template == rule.template || r.same_family(rule))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRef {
    pub number: u64,
    pub suffix: String,
}

/// What a classification matched, before any schema probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchData {
    Single {
        table: String,
    },
    /// Dependent tables of one block; `present` maps slot name to table name.
    Block {
        block: String,
        suffix: String,
        present: BTreeMap<String, String>,
    },
    /// Tables sharing a run number; missing slots are absent from `slots`.
    RunSlots {
        run: String,
        prefix: String,
        slots: BTreeMap<String, String>,
    },
    RunPair {
        first: RunRef,
        second: RunRef,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: LogicalTableKey,
    pub template: TemplateType,
    pub priority: u32,
    pub data: MatchData,
}
