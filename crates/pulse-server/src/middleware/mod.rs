//! The ordered middleware chain.
//!
//! Outermost to innermost: recovery (tower-http `CatchPanicLayer`),
//! request logging, signature verification and response signing, payload
//! decryption, gzip framing. The signature middleware sits *outside* the
//! gzip middleware on purpose: it hashes the bytes that traveled on the
//! wire (decompressing a gzip body itself when needed), and on the way
//! out it signs the already-compressed response bytes.

pub mod decrypt;
pub mod gzip;
pub mod logging;
pub mod signature;

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;

/// Upper bound on buffered request/response bodies (32 MiB).
pub(crate) const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub(crate) async fn buffer_body(body: Body) -> Result<Bytes, axum::Error> {
    axum::body::to_bytes(body, MAX_BODY_BYTES).await
}

pub(crate) fn content_encoding_is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(pulse_codec::gzip::is_gzip_encoding)
}
