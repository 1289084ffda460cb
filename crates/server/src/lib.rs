//! HTTP surface over the production pipeline.

pub mod api;
pub mod app;
pub mod state;

pub use app::build_app;
pub use state::AppState;
