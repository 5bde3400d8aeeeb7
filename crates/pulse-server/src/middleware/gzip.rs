//! Gzip framing for requests and responses.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::{buffer_body, content_encoding_is_gzip};

/// Content types worth compressing on the way out.
const COMPRESSIBLE: [&str; 10] = [
    "text/html",
    "text/css",
    "text/plain",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/json",
    "application/xml",
    "application/x-yaml",
    "image/svg+xml",
];

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "html" | "htm" => Some("text/html"),
        "css" => Some("text/css"),
        "txt" => Some("text/plain"),
        "js" => Some("application/javascript"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        "yaml" | "yml" => Some("application/x-yaml"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"))
}

/// Resolves the content type the compressibility decision is based on:
/// the response header when present, then the URL extension, then the
/// request `Accept` header.
fn resolve_content_type(
    response_headers: &HeaderMap,
    path: &str,
    accept: Option<&str>,
) -> String {
    if let Some(ct) = response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if !ct.is_empty() {
            return ct.to_string();
        }
    }
    if let Some(ext) = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
    {
        if let Some(mime) = mime_for_extension(&ext.to_ascii_lowercase()) {
            return mime.to_string();
        }
    }
    accept.unwrap_or_default().to_string()
}

fn is_compressible(content_type: &str) -> bool {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    COMPRESSIBLE.contains(&base.as_str())
}

/// Decompresses gzip request bodies and compresses eligible responses.
pub async fn gzip_layer(req: Request, next: Next) -> Response {
    let client_accepts_gzip = accepts_gzip(req.headers());
    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let path = req.uri().path().to_string();

    // Inbound: transparently unwrap gzip bodies.
    let req = if content_encoding_is_gzip(req.headers()) {
        let (mut parts, body) = req.into_parts();
        let Ok(bytes) = buffer_body(body).await else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        match pulse_codec::gzip::decompress(&bytes) {
            Ok(decompressed) => {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(decompressed.len()));
                Request::from_parts(parts, Body::from(decompressed))
            }
            Err(e) => {
                warn!(error = %e, "rejecting request with bad gzip body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        req
    };

    let response = next.run(req).await;

    // Outbound: compress only when the client asked for it and the
    // resolved content type is in the compressible set.
    if !client_accepts_gzip {
        return response;
    }
    let content_type = resolve_content_type(response.headers(), &path, accept.as_deref());
    if !is_compressible(&content_type) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = buffer_body(body).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    match pulse_codec::gzip::compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.insert(
                header::VARY,
                HeaderValue::from_static("Accept-Encoding"),
            );
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            warn!(error = %e, "response compression failed, sending identity");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
