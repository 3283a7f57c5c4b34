// Placeholder resolver - turns a classification into a complete substitution map
use crate::application::schema_inspector::SchemaInspector;
use crate::domain::classification::{Classification, MatchData, RunRef, TemplateType};
use crate::domain::error::PipelineError;
use crate::domain::placeholder::{missing_table, missing_table_for_run, DependencyState, PlaceholderMap};
use std::collections::BTreeMap;

const PATH_TYPES: [&str; 4] = ["in2reg", "in2out", "reg2out", "reg2mem"];

/// (token, missing-table slot, table suffix within a block)
const BLOCK_TABLES: [(&str, &str, &str); 3] = [
    ("{{RUN_TABLE}}", "run", "grafana"),
    ("{{TIME_TABLE}}", "time", "pathgroups"),
    ("{{DRC_TABLE}}", "drc", "violations"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub placeholders: PlaceholderMap,
    pub dependencies: DependencyState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderResolver;

impl PlaceholderResolver {
    pub fn new() -> Self {
        Self
    }

    /// `Ok(None)` when the classification is not eligible for a dashboard
    /// (a run pair none of whose dependent tables exist).
    pub async fn resolve(
        &self,
        classification: &Classification,
        schema: &dyn SchemaInspector,
    ) -> Result<Option<Resolution>, PipelineError> {
        match &classification.data {
            MatchData::Single { table } => Ok(Some(resolve_single(classification.template, table))),
            MatchData::Block { block, suffix, present } => {
                resolve_block(block, suffix, present, schema).await.map(Some)
            }
            MatchData::RunSlots { run, prefix, slots } => {
                Ok(Some(resolve_run_slots(classification.template, run, prefix, slots)))
            }
            MatchData::RunPair { first, second } => resolve_run_pair(first, second, schema).await,
        }
    }
}

fn resolve_single(template: TemplateType, table: &str) -> Resolution {
    let placeholders = match template {
        TemplateType::DelayStack => {
            PlaceholderMap::new(table, format!("{} Paths", path_type(table).to_uppercase()))
                .with("{{TABLE_NAME}}", table)
        }
        TemplateType::Errors => {
            PlaceholderMap::new(format!("errors-{table}"), format!("Error Analysis - {table}"))
                .with("{{TABLE_NAME}}", table)
        }
        TemplateType::Skew => {
            PlaceholderMap::new(format!("skew-{table}"), format!("Clock Skew Analysis - {table}"))
                .with("{{TABLE_NAME}}", table)
        }
        _ => PlaceholderMap::new(table, table)
            .with("PLACEHOLDER_TABLE_NAME", table)
            .with("{{TABLE_NAME}}", table),
    };
    Resolution { placeholders, dependencies: DependencyState::default() }
}

/// Leftmost path-type marker in the table name.
fn path_type(table: &str) -> &'static str {
    let lower = table.to_lowercase();
    PATH_TYPES
        .iter()
        .filter_map(|p| lower.find(p).map(|at| (at, *p)))
        .min()
        .map_or("", |(_, p)| p)
}

async fn resolve_block(
    block: &str,
    suffix: &str,
    present: &BTreeMap<String, String>,
    schema: &dyn SchemaInspector,
) -> Result<Resolution, PipelineError> {
    let mut placeholders = PlaceholderMap::new(format!("qor-{block}"), format!("{block} QoR"));
    let mut dependencies = DependencyState::default();

    for (token, missing_slot, slot) in BLOCK_TABLES {
        let table = match present.get(slot) {
            Some(table) => Some(table.clone()),
            None => {
                let expected = format!("{block}_{slot}_pd{suffix}");
                schema.table_exists(&expected).await?.then_some(expected)
            }
        };
        dependencies.record(token, table.is_some());
        placeholders.insert(token, table.unwrap_or_else(|| missing_table(missing_slot)));
    }

    Ok(Resolution { placeholders, dependencies })
}

fn resolve_run_slots(
    template: TemplateType,
    run: &str,
    prefix: &str,
    slots: &BTreeMap<String, String>,
) -> Resolution {
    let kind = match template {
        TemplateType::SlackCompare => "slack-compare",
        _ => "delay-compare",
    };
    let mut placeholders =
        PlaceholderMap::new(format!("run{run}-{kind}"), format!("{prefix} Run {run}").trim_start().to_string())
            .with("{{RUN_NUMBER}}", run);
    let mut dependencies = DependencyState::default();

    for (token, slot) in [("{{CTS_TABLE}}", "cts"), ("{{ROUTE_TABLE}}", "route")] {
        let table = slots.get(slot);
        dependencies.record(token, table.is_some());
        placeholders.insert(
            token,
            table.cloned().unwrap_or_else(|| missing_table_for_run(slot, run)),
        );
    }

    Resolution { placeholders, dependencies }
}

async fn resolve_run_pair(
    first: &RunRef,
    second: &RunRef,
    schema: &dyn SchemaInspector,
) -> Result<Option<Resolution>, PipelineError> {
    let (a, sa) = (first.number, first.suffix.as_str());
    let (b, sb) = (second.number, second.suffix.as_str());

    let mut placeholders = PlaceholderMap::new(format!("run{a}-vs-run{b}"), format!("Run {a} vs Run {b}"))
        .with("{{RUN_NUMBER}}", a.to_string())
        .with("{{NEXT_RUN_NUMBER}}", b.to_string());
    let mut dependencies = DependencyState::default();

    // (token, missing-table slot, run for the sentinel, expected table)
    let dependents = [
        ("{{RUN_TABLE}}", "run", a, format!("run{a}_g{a}{sa}")),
        ("{{NEXT_RUN_TABLE}}", "next_run", b, format!("run{b}_g{b}{sb}")),
        ("{{RUN_POWER_TABLE}}", "run_power", a, format!("run{a}_{a}{sa}")),
        ("{{NEXT_RUN_POWER_TABLE}}", "next_run_power", b, format!("run{b}_{b}{sb}")),
        ("{{RUN_COMPARE_TABLE}}", "run_compare", a, format!("run{a}_d{sa}")),
        ("{{NEXT_RUN_COMPARE_TABLE}}", "next_run_compare", b, format!("run{b}_d{sb}")),
        ("{{DRC_TABLE}}", "drc", a, format!("drc{a}{sa}")),
        ("{{NEXT_DRC_TABLE}}", "next_drc", b, format!("drc{b}{sb}")),
    ];

    let mut any_present = false;
    for (token, slot, run, table) in dependents {
        let exists = schema.table_exists(&table).await?;
        any_present |= exists;
        dependencies.record(token, exists);
        placeholders.insert(token, if exists { table } else { missing_table_for_run(slot, run) });
    }

    Ok(any_present.then_some(Resolution { placeholders, dependencies }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::FakeSchema;
    use crate::domain::classification::LogicalTableKey;

    fn classification(template: TemplateType, key: &str, data: MatchData) -> Classification {
        Classification { key: LogicalTableKey::new(key), template, priority: 0, data }
    }

    #[tokio::test]
    async fn test_skew_identifier() {
        let c = classification(
            TemplateType::Skew,
            "clk_skew_analysis",
            MatchData::Single { table: "clk_skew_analysis".into() },
        );
        let r = PlaceholderResolver::new().resolve(&c, &FakeSchema::default()).await.unwrap().unwrap();
        assert_eq!(r.placeholders.identifier(), "skew-clk_skew_analysis");
        assert_eq!(r.placeholders.title_suffix(), "Clock Skew Analysis - clk_skew_analysis");
        assert_eq!(r.placeholders.get("{{TABLE_NAME}}"), Some("clk_skew_analysis"));
        assert!(r.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_delay_stack_title_uses_path_type() {
        let c = classification(
            TemplateType::DelayStack,
            "late_top_reg2out",
            MatchData::Single { table: "late_top_reg2out".into() },
        );
        let r = PlaceholderResolver::new().resolve(&c, &FakeSchema::default()).await.unwrap().unwrap();
        assert_eq!(r.placeholders.identifier(), "late_top_reg2out");
        assert_eq!(r.placeholders.title_suffix(), "REG2OUT Paths");
    }

    #[tokio::test]
    async fn test_block_marks_missing_dependency() {
        let schema = FakeSchema::with_tables(&["foo_grafana_pd", "foo_pathgroups_pd"]);
        let present = BTreeMap::from([
            ("grafana".to_string(), "foo_grafana_pd".to_string()),
            ("pathgroups".to_string(), "foo_pathgroups_pd".to_string()),
        ]);
        let c = classification(
            TemplateType::Qor,
            "foo_grafana_pd",
            MatchData::Block { block: "foo".into(), suffix: String::new(), present },
        );

        let r = PlaceholderResolver::new().resolve(&c, &schema).await.unwrap().unwrap();
        assert_eq!(r.placeholders.identifier(), "qor-foo");
        assert_eq!(r.placeholders.get("{{RUN_TABLE}}"), Some("foo_grafana_pd"));
        assert_eq!(r.placeholders.get("{{DRC_TABLE}}"), Some("placeholder_drc_table"));
        assert_eq!(r.dependencies.is_present("{{DRC_TABLE}}"), Some(false));
        assert_eq!(r.dependencies.is_present("{{TIME_TABLE}}"), Some(true));
    }

    #[tokio::test]
    async fn test_block_checks_tables_outside_the_group() {
        let schema = FakeSchema::with_tables(&["foo_grafana_pd", "foo_violations_pd"]);
        let present = BTreeMap::from([("grafana".to_string(), "foo_grafana_pd".to_string())]);
        let c = classification(
            TemplateType::Qor,
            "foo_grafana_pd",
            MatchData::Block { block: "foo".into(), suffix: String::new(), present },
        );

        let r = PlaceholderResolver::new().resolve(&c, &schema).await.unwrap().unwrap();
        assert_eq!(r.placeholders.get("{{DRC_TABLE}}"), Some("foo_violations_pd"));
        assert_eq!(r.placeholders.get("{{TIME_TABLE}}"), Some("placeholder_time_table"));
    }

    #[tokio::test]
    async fn test_run_slots_fill_missing_slot_with_sentinel() {
        let slots = BTreeMap::from([("cts".to_string(), "top_cts2".to_string())]);
        let c = classification(
            TemplateType::SlackCompare,
            "run2-compare-slack",
            MatchData::RunSlots { run: "2".into(), prefix: "top".into(), slots },
        );

        let r = PlaceholderResolver::new().resolve(&c, &FakeSchema::default()).await.unwrap().unwrap();
        assert_eq!(r.placeholders.identifier(), "run2-slack-compare");
        assert_eq!(r.placeholders.title_suffix(), "top Run 2");
        assert_eq!(r.placeholders.get("{{CTS_TABLE}}"), Some("top_cts2"));
        assert_eq!(r.placeholders.get("{{ROUTE_TABLE}}"), Some("placeholder_route_table_2"));
        assert_eq!(r.placeholders.get("{{RUN_NUMBER}}"), Some("2"));
    }

    #[tokio::test]
    async fn test_run_pair_requires_one_dependent_table() {
        let first = RunRef { number: 1, suffix: String::new() };
        let second = RunRef { number: 2, suffix: "_csv".into() };
        let c = classification(
            TemplateType::RunCompare,
            "run1-vs-run2",
            MatchData::RunPair { first, second },
        );

        let none = PlaceholderResolver::new().resolve(&c, &FakeSchema::default()).await.unwrap();
        assert!(none.is_none());

        let schema = FakeSchema::with_tables(&["run2_g2_csv", "drc1"]);
        let r = PlaceholderResolver::new().resolve(&c, &schema).await.unwrap().unwrap();
        assert_eq!(r.placeholders.identifier(), "run1-vs-run2");
        assert_eq!(r.placeholders.get("{{NEXT_RUN_TABLE}}"), Some("run2_g2_csv"));
        assert_eq!(r.placeholders.get("{{DRC_TABLE}}"), Some("drc1"));
        assert_eq!(r.placeholders.get("{{RUN_TABLE}}"), Some("placeholder_run_table_1"));
        assert_eq!(r.placeholders.get("{{NEXT_DRC_TABLE}}"), Some("placeholder_next_drc_table_2"));
        assert_eq!(r.dependencies.missing().count(), 6);
    }
}
