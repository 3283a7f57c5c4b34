// Template renderer - produces a new dashboard tree from a canonical template
use crate::domain::classification::TemplateType;
use crate::domain::dashboard::RenderedDashboard;
use crate::domain::error::PipelineError;
use crate::domain::placeholder::{PlaceholderMap, MISSING_TABLE_PREFIX};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const DATASOURCE_TOKENS: [&str; 3] = ["PLACEHOLDER_DATASOURCE_UID", "${DATASOURCE_UID}", "{{DATASOURCE_UID}}"];
const UID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    missing_relation: Regex,
    unresolved: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            missing_relation: Regex::new(&format!(r"(?i)\b(FROM|JOIN)\s+({MISSING_TABLE_PREFIX}[a-z0-9_]+)\b"))?,
            unresolved: Regex::new(r"\{\{[^{}]*\}\}|PLACEHOLDER_[A-Z_]+|\$\{DATASOURCE_UID\}")?,
        })
    }

    /// Renders `template` without mutating it. Fails when any placeholder
    /// token survives substitution.
    pub fn render(
        &self,
        template_type: TemplateType,
        template: &Value,
        placeholders: &PlaceholderMap,
        datasource_uid: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RenderedDashboard, PipelineError> {
        let mut definition = self.transform(template, &|text| self.substitute(text, placeholders, datasource_uid));

        let uid = if template_type.is_dedupable() {
            dedupable_uid(template_type, placeholders.identifier())
        } else {
            random_uid()
        };
        let title = format!(
            "{} Dashboard: {} ({})",
            template_type.as_str().to_uppercase(),
            placeholders.title_suffix(),
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        match definition.as_object_mut() {
            Some(root) => {
                root.insert("uid".to_string(), Value::String(uid.clone()));
                root.insert("title".to_string(), Value::String(title.clone()));
                root.insert("id".to_string(), Value::Null);
            }
            None => {
                return Err(PipelineError::Render {
                    template: template_type.to_string(),
                    reason: "template root is not a JSON object".to_string(),
                });
            }
        }

        if let Some(token) = self.first_unresolved(&definition) {
            return Err(PipelineError::Render {
                template: template_type.to_string(),
                reason: format!("unresolved placeholder {token}"),
            });
        }

        Ok(RenderedDashboard { uid, title, template: template_type, definition })
    }

    fn substitute(&self, text: &str, placeholders: &PlaceholderMap, datasource_uid: Option<&str>) -> String {
        let mut out = text.to_string();

        // Without a datasource the token is left in place and reported as unresolved.
        if let Some(uid) = datasource_uid {
            for token in DATASOURCE_TOKENS {
                if out.contains(token) {
                    out = out.replace(token, uid);
                }
            }
        }

        for (token, value) in placeholders.tokens() {
            if out.contains(token) {
                out = out.replace(token, value);
            }
        }

        if out.contains(MISSING_TABLE_PREFIX) {
            out = self
                .missing_relation
                .replace_all(&out, "${1} (SELECT 1 WHERE FALSE) AS ${2}")
                .into_owned();
        }
        out
    }

    /// Builds a new tree, applying `f` to every string leaf. Object keys are kept.
    fn transform(&self, value: &Value, f: &dyn Fn(&str) -> String) -> Value {
        match value {
            Value::String(s) => Value::String(f(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.transform(v, f)).collect()),
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.transform(v, f)))
                    .collect::<Map<String, Value>>(),
            ),
            leaf => leaf.clone(),
        }
    }

    fn first_unresolved(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => self.unresolved.find(s).map(|m| m.as_str().to_string()),
            Value::Array(items) => items.iter().find_map(|v| self.first_unresolved(v)),
            Value::Object(fields) => fields.values().find_map(|v| self.first_unresolved(v)),
            _ => None,
        }
    }
}

/// `<template>-<first 10 hex chars of sha256(identifier)>`
pub fn dedupable_uid(template_type: TemplateType, identifier: &str) -> String {
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    format!("{}-{}", template_type.as_str(), &digest[..10])
}

fn random_uid() -> String {
    let mut rng = rand::rng();
    (0..8)
        .map(|_| UID_ALPHABET[rng.random_range(0..UID_ALPHABET.len())] as char)
        .collect()
}
