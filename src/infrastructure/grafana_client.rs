// Grafana HTTP API client - dashboards and datasources
use crate::application::dashboard_api::{DashboardApi, DatasourceDirectory};
use crate::domain::dashboard::RenderedDashboard;
use crate::domain::error::PipelineError;
use crate::domain::tenant::{DatabaseTarget, GrafanaCredentials};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SaveDashboardResponse {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasourceSummary {
    name: String,
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateDatasourceResponse {
    #[serde(default)]
    datasource: Option<CreatedDatasource>,
}

#[derive(Debug, Deserialize)]
struct CreatedDatasource {
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
}

impl GrafanaClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Grafana HTTP client")?;
        Ok(Self { http })
    }

    async fn save_dashboard(
        &self,
        operation: &'static str,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(api_url(&grafana.base_url, "/api/dashboards/db"))
            .bearer_auth(grafana.api_key.expose())
            .json(&save_payload(dashboard))
            .send()
            .await
            .map_err(|e| PipelineError::remote(operation, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::remote(operation, format!("status {}: {}", status, body)));
        }

        let saved: SaveDashboardResponse =
            response.json().await.map_err(|e| PipelineError::remote(operation, e))?;

        let relative = saved
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PipelineError::remote(operation, "response carried no dashboard url"))?;

        let url = api_url(&grafana.base_url, &relative);
        tracing::info!(uid = %dashboard.uid, %url, "Saved dashboard");
        Ok(url)
    }
}

#[async_trait]
impl DashboardApi for GrafanaClient {
    async fn create_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError> {
        self.save_dashboard("create dashboard", grafana, dashboard).await
    }

    async fn update_dashboard(
        &self,
        grafana: &GrafanaCredentials,
        dashboard: &RenderedDashboard,
    ) -> Result<String, PipelineError> {
        self.save_dashboard("update dashboard", grafana, dashboard).await
    }
}

#[async_trait]
impl DatasourceDirectory for GrafanaClient {
    async fn find_by_name(&self, grafana: &GrafanaCredentials, name: &str) -> Result<Option<String>, PipelineError> {
        const OP: &str = "list datasources";

        let response = self
            .http
            .get(api_url(&grafana.base_url, "/api/datasources"))
            .bearer_auth(grafana.api_key.expose())
            .send()
            .await
            .map_err(|e| PipelineError::remote(OP, e))?;

        if !response.status().is_success() {
            return Err(PipelineError::remote(OP, format!("status {}", response.status())));
        }

        let sources: Vec<DatasourceSummary> = response.json().await.map_err(|e| PipelineError::remote(OP, e))?;
        Ok(select_datasource_uid(sources, name))
    }

    async fn create_postgres(
        &self,
        grafana: &GrafanaCredentials,
        target: &DatabaseTarget,
    ) -> Result<String, PipelineError> {
        const OP: &str = "create datasource";

        let response = self
            .http
            .post(api_url(&grafana.base_url, "/api/datasources"))
            .bearer_auth(grafana.api_key.expose())
            .json(&datasource_payload(target))
            .send()
            .await
            .map_err(|e| PipelineError::remote(OP, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::remote(OP, format!("status {}: {}", status, body)));
        }

        let created: CreateDatasourceResponse = response.json().await.map_err(|e| PipelineError::remote(OP, e))?;
        let uid = created
            .datasource
            .and_then(|d| d.uid)
            .ok_or_else(|| PipelineError::remote(OP, "response carried no datasource uid"))?;

        tracing::info!(database = %target.database, %uid, "Created postgres datasource");
        Ok(uid)
    }
}

fn api_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn save_payload(dashboard: &RenderedDashboard) -> Value {
    json!({
        "dashboard": dashboard.definition,
        "overwrite": true,
        "folderId": 0,
    })
}

fn datasource_payload(target: &DatabaseTarget) -> Value {
    json!({
        "name": target.database,
        "type": "postgres",
        "access": "proxy",
        "url": format!("{}:{}", target.host, target.port),
        "user": target.user,
        "database": target.database,
        "basicAuth": false,
        "secureJsonData": { "password": target.password.expose() },
        "jsonData": {
            "sslmode": if target.ssl { "require" } else { "disable" },
            "postgresVersion": 1200,
        },
    })
}

fn select_datasource_uid(sources: Vec<DatasourceSummary>, name: &str) -> Option<String> {
    sources.into_iter().find(|s| s.name == name).and_then(|s| s.uid)
}
