// Infrastructure layer - External dependencies and adapters
pub mod browser_capture;
pub mod config;
pub mod grafana_client;
pub mod postgres_repository;
pub mod postgres_tenants;
pub mod schema_inspector;
pub mod slack_client;
pub mod snapshot_retention;
pub mod teams_client;
pub mod template_store;
pub mod tenant_lock;
