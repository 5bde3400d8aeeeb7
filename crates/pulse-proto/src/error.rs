//! Error types for the data model.

use thiserror::Error;

/// Errors produced while validating metric records.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The metric type is neither `counter` nor `gauge`.
    #[error("unsupported metric type: {kind}")]
    UnsupportedKind {
        /// The offending type string.
        kind: String,
    },

    /// The metric name is empty.
    #[error("metric name is required")]
    EmptyName,

    /// The gauge text does not parse as a finite double.
    #[error("invalid gauge value: {raw}")]
    InvalidGauge {
        /// The offending value text.
        raw: String,
    },

    /// The counter text does not parse as a signed 64-bit integer.
    #[error("invalid counter value: {raw}")]
    InvalidCounter {
        /// The offending value text.
        raw: String,
    },

    /// A counter record is missing its `delta` field.
    #[error("delta is required for counter")]
    MissingDelta,

    /// A gauge record is missing its `value` field.
    #[error("value is required for gauge")]
    MissingValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unsupported_kind() {
        let err = ProtoError::UnsupportedKind {
            kind: "histogram".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported metric type: histogram");
    }

    #[test]
    fn error_display_invalid_gauge() {
        let err = ProtoError::InvalidGauge {
            raw: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "invalid gauge value: abc");
    }

    #[test]
    fn error_display_missing_fields() {
        assert_eq!(
            ProtoError::MissingDelta.to_string(),
            "delta is required for counter"
        );
        assert_eq!(
            ProtoError::MissingValue.to_string(),
            "value is required for gauge"
        );
    }
}
