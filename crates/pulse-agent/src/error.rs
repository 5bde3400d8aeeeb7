//! Error types for the agent.

use thiserror::Error;

/// Errors produced while collecting or shipping metrics.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Payload serialization failed.
    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Encryption or compression failed.
    #[error(transparent)]
    Codec(#[from] pulse_codec::CodecError),

    /// The HTTP request could not be performed.
    #[error("send failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a 5xx status.
    #[error("server responded with {0}")]
    ServerStatus(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_display() {
        assert_eq!(
            AgentError::ServerStatus(503).to_string(),
            "server responded with 503"
        );
    }

    #[test]
    fn server_status_is_not_transient() {
        // A 5xx is reported, not retried; only connection-level failures
        // qualify for backoff.
        assert!(!pulse_retry::is_transient(&AgentError::ServerStatus(500)));
    }
}
