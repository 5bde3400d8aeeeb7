//! # pulse-server
//!
//! The ingestion side of the pulsegrid pipeline: an axum HTTP server that
//! validates, stores and serves metrics shipped by the agent.
//!
//! Request processing is an ordered middleware chain:
//!
//! ```text
//! recovery → logging → signature verify/sign → decrypt → gzip → handler
//! ```
//!
//! The signature covers the bytes after decompression but before
//! decryption, which is exactly what the agent signs; the order above is a
//! correctness requirement, not a preference.

pub mod config;
pub mod error;
pub mod handlers;
pub mod index;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod service;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServiceError};
pub use routes::build_router;
pub use server::run;
pub use service::MetricsService;
pub use state::AppState;
