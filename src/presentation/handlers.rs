// HTTP request handlers
use crate::application::orchestrator::PassOutcome;
use crate::domain::category::DatabaseCategory;
use crate::domain::tenant::{Tenant, TenantId};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn lookup_tenant(state: &AppState, id: i64) -> Result<Tenant, Response> {
    match state.tenants.find_tenant(TenantId(id)).await {
        Ok(Some(tenant)) => Ok(tenant),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, format!("tenant {} not found", id))),
        Err(e) => {
            tracing::error!(tenant_id = id, "Tenant lookup failed: {}", e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

/// Run one pipeline pass for a tenant right now. The pass runs on its own
/// task so a client disconnect does not cut it short.
pub async fn trigger_pass(Path(id): Path<i64>, State(state): State<Arc<AppState>>) -> Response {
    let tenant = match lookup_tenant(&state, id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };

    let orchestrator = state.orchestrator.clone();
    let cancel = state.cancel.clone();
    let pass = tokio::spawn(async move { orchestrator.run_pass(&tenant, &cancel).await });

    match pass.await {
        Ok(Ok(PassOutcome::Completed(report))) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Ok(PassOutcome::LockHeld)) => error_response(
            StatusCode::CONFLICT,
            format!("a pass for tenant {} is already running", id),
        ),
        Ok(Err(e)) => {
            tracing::error!(tenant_id = id, "Manual pass failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            tracing::error!(tenant_id = id, "Manual pass task ended abnormally: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// List the tenant's dashboard records across all categories
pub async fn list_dashboards(Path(id): Path<i64>, State(state): State<Arc<AppState>>) -> Response {
    let tenant = match lookup_tenant(&state, id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };

    let mut records = Vec::new();
    for category in DatabaseCategory::ALL {
        match state.repository.list_for_tenant(category, tenant.id).await {
            Ok(mut found) => records.append(&mut found),
            Err(e) => {
                tracing::error!(tenant_id = id, %category, "Listing dashboards failed: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
            }
        }
    }

    Json(records).into_response()
}
