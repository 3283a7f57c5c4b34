// Loads the dashboard JSON templates from disk into a catalog
use crate::application::template_catalog::TemplateCatalog;
use crate::domain::classification::TemplateType;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Reads every template file from `dir`. Any missing or malformed file is an
/// error, so a bad deployment fails at startup rather than mid-pass.
pub fn load_template_catalog(dir: &Path) -> Result<TemplateCatalog> {
    let mut templates = BTreeMap::new();

    for template in TemplateType::ALL {
        let path = dir.join(template.file_name());
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let definition: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Template {} is not valid JSON", path.display()))?;

        if !definition.is_object() {
            anyhow::bail!("Template {} must be a JSON object", path.display());
        }

        templates.insert(template, definition);
    }

    tracing::info!(dir = %dir.display(), count = templates.len(), "Loaded dashboard templates");
    Ok(TemplateCatalog::new(templates))
}
