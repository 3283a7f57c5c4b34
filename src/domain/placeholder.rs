// Placeholder maps and dependency state produced by resolution
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every missing-table sentinel starts with this prefix. The renderer turns
/// `FROM <sentinel>` into an empty subquery so panels return zero rows.
pub const MISSING_TABLE_PREFIX: &str = "placeholder_";

pub fn missing_table(slot: &str) -> String {
    format!("{MISSING_TABLE_PREFIX}{slot}_table")
}

pub fn missing_table_for_run(slot: &str, run: impl std::fmt::Display) -> String {
    format!("{MISSING_TABLE_PREFIX}{slot}_table_{run}")
}

pub fn is_missing_table(value: &str) -> bool {
    value.starts_with(MISSING_TABLE_PREFIX)
}

/// Token -> literal replacement, plus the two naming values every
/// classification carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaceholderMap {
    tokens: BTreeMap<String, String>,
    identifier: String,
    title_suffix: String,
}

impl PlaceholderMap {
    pub fn new(identifier: impl Into<String>, title_suffix: impl Into<String>) -> Self {
        Self {
            tokens: BTreeMap::new(),
            identifier: identifier.into(),
            title_suffix: title_suffix.into(),
        }
    }

    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(token, value);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(token.into(), value.into());
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        match token {
            "identifier" => Some(&self.identifier),
            "titleSuffix" => Some(&self.title_suffix),
            _ => self.tokens.get(token).map(String::as_str),
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn title_suffix(&self) -> &str {
        &self.title_suffix
    }
}

/// Which dependent tables were present (true) or substituted with a
/// missing-table sentinel (false) when a dashboard was rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyState(BTreeMap<String, bool>);

impl DependencyState {
    pub fn record(&mut self, token: impl Into<String>, present: bool) {
        self.0.insert(token.into(), present);
    }

    pub fn is_present(&self, token: &str) -> Option<bool> {
        self.0.get(token).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, present)| !**present).map(|(k, _)| k.as_str())
    }

    /// Tokens whose presence differs between the two states. A token known on
    /// only one side counts as a transition.
    pub fn transitions(&self, previous: &DependencyState) -> Vec<String> {
        let mut changed: Vec<String> = self
            .0
            .iter()
            .filter(|(token, present)| previous.0.get(*token) != Some(present))
            .map(|(token, _)| token.clone())
            .collect();
        changed.extend(
            previous
                .0
                .keys()
                .filter(|token| !self.0.contains_key(*token))
                .cloned(),
        );
        changed
    }
}
