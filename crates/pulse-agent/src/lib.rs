//! # pulse-agent
//!
//! The host-side half of the pipeline: samplers feed a shared metric
//! registry, a scheduler snapshots it on the report interval, and a
//! bounded worker pool ships the snapshots to the server as batches.
//!
//! ```text
//! runtime sampler ─┐
//!                  ├─> registry ─> reporter ─> queue(rate_limit) ─> workers ─> HTTP
//! os sampler ──────┘
//! ```
//!
//! One root shutdown signal reaches every task; `Agent::run` returns
//! only after all producers and workers have exited.

pub mod alloc;
pub mod collector;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod sender;
pub mod system;

pub use alloc::CountingAllocator;
pub use config::AgentConfig;
pub use error::AgentError;
pub use scheduler::Agent;
pub use sender::Sender;
