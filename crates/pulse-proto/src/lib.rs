//! # pulse-proto
//!
//! Data model shared by the pulsegrid agent and server:
//!
//! - [`Metric`] — the JSON wire record exchanged over HTTP
//! - [`MetricKind`] — counter (additive) vs gauge (last-write-wins)
//! - [`MetricPayload`] — a leniently-typed inbound record for request decoding
//! - [`MetricsSnapshot`] — the JSON snapshot file layout
//! - gauge/counter text parsing and the canonical gauge rendering
//!
//! Gauges travel as `f64` on the wire but are *persisted* as their exact
//! source text so that repeated store/load round-trips never drift. The
//! canonical rendering ([`format_gauge`]) trims trailing zeros, so `42.0`
//! renders as `42`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod metric;
pub mod snapshot;
pub mod text;

pub use error::ProtoError;
pub use metric::{Metric, MetricKind, MetricPayload};
pub use snapshot::MetricsSnapshot;
pub use text::{format_gauge, parse_counter_text, parse_gauge_text};

/// Result type for data-model operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
