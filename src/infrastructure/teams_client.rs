// Microsoft Teams incoming-webhook notifier
use crate::application::notifier::{DashboardNotice, WebhookNotifier};
use crate::domain::error::PipelineError;
use crate::domain::tenant::WebhookDestination;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TeamsClient {
    http: reqwest::Client,
}

impl TeamsClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Teams HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookNotifier for TeamsClient {
    async fn post_card(&self, destination: &WebhookDestination, notice: &DashboardNotice) -> Result<(), PipelineError> {
        let response = self
            .http
            .post(destination.url.expose())
            .json(&message_card(notice))
            .send()
            .await
            .map_err(|e| failure(e.without_url()))?;

        // Teams answers 200 with a plain "1" body on success
        if response.status() != reqwest::StatusCode::OK {
            return Err(failure(format!("webhook returned status {}", response.status())));
        }

        tracing::info!(table = %notice.table, "Posted dashboard card to Teams");
        Ok(())
    }
}

fn failure(reason: impl std::fmt::Display) -> PipelineError {
    PipelineError::Notification { destination: "teams", reason: reason.to_string() }
}

fn message_card(notice: &DashboardNotice) -> Value {
    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": "0076D7",
        "summary": format!("New dashboard created by {}", notice.creator),
        "sections": [{
            "activityTitle": format!("New Dashboard Created by {}", notice.creator),
            "facts": [
                { "name": "User", "value": notice.creator },
                { "name": "Table Name", "value": notice.table },
                { "name": "Timestamp", "value": notice.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string() }
            ],
            "markdown": true
        }],
        "potentialAction": [{
            "@type": "OpenUri",
            "name": "View Dashboard",
            "targets": [{ "os": "default", "uri": notice.url }]
        }]
    })
}
