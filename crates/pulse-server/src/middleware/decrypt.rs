//! Hybrid-envelope decryption.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::{buffer_body, content_encoding_is_gzip};
use crate::state::AppState;

/// Replaces envelope-shaped request bodies with their plaintext when the
/// server holds the private key. Other bodies pass through untouched.
///
/// When the signature middleware is disabled the body can still be
/// gzip-framed at this point, so the envelope check decompresses first.
pub async fn decrypt_request(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(private_key) = &state.private_key else {
        return next.run(req).await;
    };
    if !matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let Ok(bytes) = buffer_body(body).await else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let raw = if content_encoding_is_gzip(&parts.headers) {
        match pulse_codec::gzip::decompress(&bytes) {
            Ok(decompressed) => {
                parts.headers.remove(header::CONTENT_ENCODING);
                decompressed
            }
            Err(e) => {
                warn!(error = %e, "rejecting request with bad gzip body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        bytes.to_vec()
    };

    let body_bytes = match pulse_codec::open_if_sealed(private_key, &raw) {
        Ok(Some(plain)) => plain,
        Ok(None) => raw,
        Err(e) => {
            warn!(error = %e, "rejecting request with bad encrypted payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body_bytes.len()));
    next.run(Request::from_parts(parts, Body::from(body_bytes)))
        .await
}
