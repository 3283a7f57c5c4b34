// Presentation layer - HTTP operations surface
pub mod app_state;
pub mod handlers;
