pub mod admin;
pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;

pub use api::{build_router, AppState};
