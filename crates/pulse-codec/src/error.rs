//! Error types for the wire codec.

use thiserror::Error;

/// Errors produced while encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The gzip stream is malformed or compression failed.
    #[error("bad gzip stream: {0}")]
    Gzip(#[from] std::io::Error),

    /// The encrypted envelope is malformed or does not decrypt.
    #[error("bad encrypted payload: {reason}")]
    Envelope {
        /// What went wrong with the envelope.
        reason: String,
    },

    /// A key file could not be read.
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        /// The path that was attempted.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// PEM data does not contain a usable RSA key.
    #[error("invalid RSA key: {reason}")]
    Key {
        /// Why the key was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_display() {
        let err = CodecError::Envelope {
            reason: "nonce is not valid base64".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bad encrypted payload: nonce is not valid base64"
        );
    }

    #[test]
    fn gzip_error_wraps_io() {
        let err = CodecError::from(std::io::Error::other("corrupt deflate stream"));
        assert!(err.to_string().contains("corrupt deflate stream"));
    }
}
