//! # pulse-codec
//!
//! Everything that happens to a metrics payload between `serde_json` and
//! the socket:
//!
//! - [`gzip`] — compression framing with a pool of reusable compressor
//!   state (disabled via `GZIP_POOL=0`)
//! - [`sign`] — the `HashSHA256` HMAC contract over wire bytes
//! - [`envelope`] — hybrid AES-256-GCM payload encryption under an
//!   RSA-OAEP-wrapped session key
//!
//! The agent applies the stages as encrypt → gzip → sign; the server
//! unwinds them as verify (over decompressed bytes) → decrypt.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod gzip;
pub mod sign;

pub use envelope::{load_private_key, load_public_key, open_if_sealed, seal};
pub use error::CodecError;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
