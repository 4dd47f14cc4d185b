//! Web service for the video highlights pipeline.
//!
//! This crate provides:
//! - Upload ingress with size and format checks
//! - In-memory sessions with a temporary working directory each
//! - The store → analyze → cut pipeline
//! - HTML results views and a JSON API
//! - Health checks and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;

pub use config::{AppConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use pipeline::Pipeline;
pub use routes::create_router;
pub use session::{Session, SessionStore, SessionSweeper};
pub use state::AppState;
