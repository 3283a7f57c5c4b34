// Canonical dashboard templates, loaded once and never mutated
use crate::domain::classification::TemplateType;
use crate::domain::error::PipelineError;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<TemplateType, Value>,
}

impl TemplateCatalog {
    pub fn new(templates: BTreeMap<TemplateType, Value>) -> Self {
        Self { templates }
    }

    pub fn get(&self, template: TemplateType) -> Result<&Value, PipelineError> {
        self.templates.get(&template).ok_or_else(|| PipelineError::Render {
            template: template.to_string(),
            reason: format!("template {} is not loaded", template.file_name()),
        })
    }
}
