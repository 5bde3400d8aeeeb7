//! `HashSHA256` verification and response signing.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pulse_codec::sign;
use tracing::warn;

use super::{buffer_body, content_encoding_is_gzip};
use crate::state::AppState;

/// Paths exempt from request verification.
const VERIFY_EXEMPT: [&str; 1] = ["/value/"];

fn has_body_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Verifies the request signature when a key is configured.
///
/// The signature covers the wire bytes; when the body arrived gzipped it
/// is decompressed first (and the encoding header stripped) so both sides
/// hash the same pre-compression bytes. A missing header skips the check
/// for compatibility with unkeyed agents.
pub async fn verify_request(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !sign::key_enabled(&state.signing_key)
        || VERIFY_EXEMPT.contains(&req.uri().path())
        || !has_body_method(req.method())
    {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let Ok(wire_bytes) = buffer_body(body).await else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let payload = if content_encoding_is_gzip(&parts.headers) {
        match pulse_codec::gzip::decompress(&wire_bytes) {
            Ok(decompressed) => {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(decompressed.len()));
                decompressed
            }
            Err(e) => {
                warn!(error = %e, "rejecting request with bad gzip body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        wire_bytes.to_vec()
    };

    if let Some(received) = parts.headers.get(sign::SIGNATURE_HEADER) {
        let Ok(received) = received.to_str() else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        if !sign::verify(&state.signing_key, &payload, received) {
            warn!(uri = %parts.uri, "rejecting request with signature mismatch");
            return StatusCode::BAD_REQUEST.into_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(payload))).await
}

/// Attaches `HashSHA256` to non-empty responses when a key is configured.
///
/// Runs outside the gzip middleware, so the signature covers the exact
/// bytes the client receives.
pub async fn sign_response(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if !sign::key_enabled(&state.signing_key) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = buffer_body(body).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if !bytes.is_empty() {
        let signature = sign::sign(&state.signing_key, &bytes);
        if let Ok(value) = HeaderValue::from_str(&signature) {
            parts.headers.insert(sign::SIGNATURE_HEADER, value);
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}
