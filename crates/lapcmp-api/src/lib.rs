//! Axum control plane for LapCompare.
//!
//! This crate provides:
//! - Upload slot signing
//! - Job start with payload validation
//! - Job status polling

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, RunnerKind};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
