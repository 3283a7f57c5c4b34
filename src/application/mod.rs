// Application layer - Use cases and the ports they depend on
pub mod classifier;
pub mod dashboard_api;
pub mod dashboard_repository;
pub mod dispatcher;
pub mod notifier;
pub mod orchestrator;
pub mod publisher;
pub mod renderer;
pub mod resolver;
pub mod scheduler;
pub mod schema_inspector;
pub mod snapshot_capturer;
pub mod template_catalog;
pub mod tenant_directory;

#[cfg(test)]
pub mod fakes;
