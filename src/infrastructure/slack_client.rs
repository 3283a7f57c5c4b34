// Slack Web API notifier - link messages and snapshot uploads
use crate::application::notifier::{ChatNotifier, DashboardNotice};
use crate::domain::error::PipelineError;
use crate::domain::tenant::ChatDestination;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

const DESTINATION: &str = "slack";
const SNAPSHOT_FILE_NAME: &str = "dashboard.gif";
const SNAPSHOT_TITLE: &str = "Dashboard GIF";

/// Envelope shared by every Slack Web API reply.
#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(default)]
    url_private: Option<String>,
}

impl SlackReply {
    fn into_ok(self, method: &str) -> Result<Self, PipelineError> {
        if self.ok {
            Ok(self)
        } else {
            Err(failure(format!(
                "{} returned {}",
                method,
                self.error.as_deref().unwrap_or("ok=false")
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
}

impl SlackClient {
    pub fn new(api_base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Slack HTTP client")?;
        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_string() })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn read_reply(response: reqwest::Response, method: &str) -> Result<SlackReply, PipelineError> {
        if !response.status().is_success() {
            return Err(failure(format!("{} returned status {}", method, response.status())));
        }
        let reply: SlackReply = response.json().await.map_err(failure)?;
        reply.into_ok(method)
    }

    async fn post_blocks(&self, destination: &ChatDestination, payload: &Value) -> Result<(), PipelineError> {
        let response = self
            .http
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(destination.bot_token.expose())
            .json(payload)
            .send()
            .await
            .map_err(failure)?;
        Self::read_reply(response, "chat.postMessage").await?;
        Ok(())
    }
}

#[async_trait]
impl ChatNotifier for SlackClient {
    async fn post_link(&self, destination: &ChatDestination, notice: &DashboardNotice) -> Result<(), PipelineError> {
        self.post_blocks(destination, &link_message(&destination.channel_id, notice)).await?;
        tracing::info!(channel = %destination.channel_id, table = %notice.table, "Posted dashboard link to Slack");
        Ok(())
    }

    async fn post_snapshot(
        &self,
        destination: &ChatDestination,
        notice: &DashboardNotice,
        snapshot: &Path,
    ) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(snapshot).await.map_err(failure)?;

        // 1. Request an upload slot
        let response = self
            .http
            .post(self.method_url("files.getUploadURLExternal"))
            .bearer_auth(destination.bot_token.expose())
            .form(&[("filename", SNAPSHOT_FILE_NAME.to_string()), ("length", bytes.len().to_string())])
            .send()
            .await
            .map_err(failure)?;
        let slot = Self::read_reply(response, "files.getUploadURLExternal").await?;
        let (upload_url, file_id) = match (slot.upload_url, slot.file_id) {
            (Some(url), Some(id)) => (url, id),
            _ => return Err(failure("upload slot is missing upload_url or file_id")),
        };

        // 2. Send the bytes
        let uploaded = self.http.post(&upload_url).body(bytes).send().await.map_err(failure)?;
        if !uploaded.status().is_success() {
            return Err(failure(format!("snapshot upload returned status {}", uploaded.status())));
        }

        // 3. Finalize into the channel
        let response = self
            .http
            .post(self.method_url("files.completeUploadExternal"))
            .bearer_auth(destination.bot_token.expose())
            .json(&complete_upload_payload(&file_id, &destination.channel_id))
            .send()
            .await
            .map_err(failure)?;
        let completed = Self::read_reply(response, "files.completeUploadExternal").await?;
        let image_url = completed
            .files
            .into_iter()
            .next()
            .and_then(|f| f.url_private)
            .ok_or_else(|| failure("completed upload carried no file url"))?;

        self.post_blocks(destination, &snapshot_message(&destination.channel_id, notice, &image_url))
            .await?;
        tracing::info!(channel = %destination.channel_id, table = %notice.table, "Posted dashboard snapshot to Slack");
        Ok(())
    }
}

fn failure(reason: impl std::fmt::Display) -> PipelineError {
    PipelineError::Notification { destination: DESTINATION, reason: reason.to_string() }
}

fn link_message(channel: &str, notice: &DashboardNotice) -> Value {
    json!({
        "channel": channel,
        "text": format!("New dashboard created by {}: {}", notice.creator, notice.url),
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": format!("New Dashboard Created by {}", notice.creator) }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Creator:*\n{}", notice.creator) },
                    { "type": "mrkdwn", "text": format!("*Table:*\n{}", notice.table) },
                    { "type": "mrkdwn", "text": format!("*Created:*\n{}", notice.created_at.format("%Y-%m-%d %H:%M:%S UTC")) }
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("<{}|View Dashboard>", notice.url) }
            }
        ]
    })
}

fn complete_upload_payload(file_id: &str, channel: &str) -> Value {
    json!({
        "files": [{ "id": file_id, "title": SNAPSHOT_TITLE }],
        "channel_id": channel,
    })
}

fn snapshot_message(channel: &str, notice: &DashboardNotice, image_url: &str) -> Value {
    json!({
        "channel": channel,
        "text": format!("Dashboard preview for {}", notice.table),
        "blocks": [
            {
                "type": "image",
                "title": { "type": "plain_text", "text": format!("Dashboard preview: {}", notice.table) },
                "image_url": image_url,
                "alt_text": SNAPSHOT_TITLE
            }
        ]
    })
}
