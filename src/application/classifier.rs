// Table classifier - pure matching of scanned table names against the rule set
use crate::domain::category::DatabaseCategory;
use crate::domain::classification::{
    Arity, Classification, ClassificationRule, LogicalTableKey, MatchData, RuleSet, RunRef, SlotSchema, TemplateType,
};
use regex::Captures;
use std::collections::BTreeMap;

/// Result of one classification pass over a schema.
#[derive(Debug, Default)]
pub struct ClassifyOutcome {
    /// Sorted by (priority, key).
    pub classifications: Vec<Classification>,
    /// Tables no rule accepted.
    pub misses: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableClassifier {
    rules: RuleSet,
}

struct BlockGroup {
    leader: usize,
    block: String,
    suffix: String,
    present: BTreeMap<String, String>,
}

struct RunSlotGroup {
    leader: usize,
    prefix: String,
    slots: BTreeMap<String, String>,
}

impl TableClassifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn for_category(rules: &RuleSet, category: DatabaseCategory) -> Self {
        Self::new(rules.restricted_to(category.templates()))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify<S: AsRef<str>>(&self, tables: &[S]) -> ClassifyOutcome {
        let mut names: Vec<&str> = tables.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names.dedup();

        let mut outcome = ClassifyOutcome::default();
        let mut blocks: BTreeMap<(String, String), BlockGroup> = BTreeMap::new();
        let mut run_slots: BTreeMap<u64, RunSlotGroup> = BTreeMap::new();
        let mut runs: BTreeMap<u64, (usize, RunRef)> = BTreeMap::new();

        for table in names {
            let Some((leader, rule)) = self.select_indexed(table) else {
                outcome.misses.push(table.to_string());
                continue;
            };

            match &rule.arity {
                Arity::SingleTable => outcome.classifications.push(Classification {
                    key: LogicalTableKey::new(table),
                    template: rule.template,
                    priority: rule.priority,
                    data: MatchData::Single { table: table.to_string() },
                }),
                Arity::Group(SlotSchema::Block { slots }) => {
                    let Some((index, caps)) = captures(rule, table) else {
                        outcome.misses.push(table.to_string());
                        continue;
                    };
                    let block = named(&caps, "key").to_string();
                    let suffix = named(&caps, "suffix").to_lowercase();
                    let Some(slot) = slots.get(index) else {
                        outcome.misses.push(table.to_string());
                        continue;
                    };
                    blocks
                        .entry((block.clone(), suffix.clone()))
                        .or_insert_with(|| BlockGroup { leader, block, suffix, present: BTreeMap::new() })
                        .present
                        .entry(slot.to_string())
                        .or_insert_with(|| table.to_string());
                }
                Arity::Group(SlotSchema::RunSlots { .. }) => {
                    let Some((_, caps)) = captures(rule, table) else {
                        outcome.misses.push(table.to_string());
                        continue;
                    };
                    let Ok(run) = named(&caps, "run").parse::<u64>() else {
                        outcome.misses.push(table.to_string());
                        continue;
                    };
                    let slot = named(&caps, "slot").to_lowercase();
                    let prefix = named(&caps, "prefix").trim_end_matches('_').to_string();
                    run_slots
                        .entry(run)
                        .or_insert_with(|| RunSlotGroup { leader, prefix, slots: BTreeMap::new() })
                        .slots
                        .entry(slot)
                        .or_insert_with(|| table.to_string());
                }
                Arity::Group(SlotSchema::RunPairs) => {
                    let parsed = captures(rule, table).and_then(|(_, caps)| {
                        let run = named(&caps, "run").parse::<u64>().ok()?;
                        let generation = named(&caps, "gen").parse::<u64>().ok()?;
                        (run == generation).then(|| RunRef { number: run, suffix: named(&caps, "suffix").to_lowercase() })
                    });
                    match parsed {
                        Some(run) => {
                            runs.entry(run.number).or_insert((leader, run));
                        }
                        None => outcome.misses.push(table.to_string()),
                    }
                }
            }
        }

        for group in blocks.into_values() {
            let leader = &self.rules.rules()[group.leader];
            for rule in self.rules.family_of(leader) {
                outcome.classifications.push(Classification {
                    key: LogicalTableKey::new(format!("{}_grafana_pd{}", group.block, group.suffix)),
                    template: rule.template,
                    priority: rule.priority,
                    data: MatchData::Block {
                        block: group.block.clone(),
                        suffix: group.suffix.clone(),
                        present: group.present.clone(),
                    },
                });
            }
        }

        for (run, group) in run_slots {
            let leader = &self.rules.rules()[group.leader];
            for rule in self.rules.family_of(leader) {
                outcome.classifications.push(Classification {
                    key: LogicalTableKey::new(run_slots_key(rule.template, run)),
                    template: rule.template,
                    priority: rule.priority,
                    data: MatchData::RunSlots {
                        run: run.to_string(),
                        prefix: group.prefix.clone(),
                        slots: group.slots.clone(),
                    },
                });
            }
        }

        // Consecutive runs, in ascending run order, form the comparison pairs.
        let ordered: Vec<(usize, RunRef)> = runs.into_values().collect();
        for pair in ordered.windows(2) {
            let [(leader, first), (_, second)] = pair else { continue };
            let leader = &self.rules.rules()[*leader];
            for rule in self.rules.family_of(leader) {
                outcome.classifications.push(Classification {
                    key: LogicalTableKey::new(format!("run{}-vs-run{}", first.number, second.number)),
                    template: rule.template,
                    priority: rule.priority,
                    data: MatchData::RunPair { first: first.clone(), second: second.clone() },
                });
            }
        }

        outcome
            .classifications
            .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.key.cmp(&b.key)));
        outcome
    }

    fn select_indexed(&self, table: &str) -> Option<(usize, &ClassificationRule)> {
        self.rules.rules().iter().enumerate().find(|(_, r)| r.matches(table))
    }
}

fn captures<'t>(rule: &ClassificationRule, table: &'t str) -> Option<(usize, Captures<'t>)> {
    let (index, pattern) = rule.matching_pattern(table)?;
    pattern.captures(table).map(|caps| (index, caps))
}

fn named<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map_or("", |m| m.as_str())
}

fn run_slots_key(template: TemplateType, run: u64) -> String {
    match template {
        TemplateType::SlackCompare => format!("run{run}-compare-slack"),
        _ => format!("run{run}-compare-delay"),
    }
}
