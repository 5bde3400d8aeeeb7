//! Route table and middleware stack.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

use crate::handlers::{
    index_page, ping, update_json, update_url, updates_batch, value_json, value_url,
};
use crate::middleware::{decrypt, gzip, logging, signature};
use crate::state::AppState;

/// Builds the router with the full middleware chain.
///
/// Layer order (outermost first): recovery, logging, signature
/// verify/sign, decrypt, gzip. On the response path this means gzip
/// compresses first and the signature is computed over the compressed
/// bytes — the same definition of wire bytes the agent uses.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/value/", post(value_json))
        .route("/updates/", post(updates_batch))
        .route("/update/{kind}/{name}/{value}", post(update_url))
        .route("/value/{kind}/{name}", get(value_url))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(from_fn(logging::log_requests))
                .layer(from_fn_with_state(
                    Arc::clone(&state),
                    signature::verify_request,
                ))
                .layer(from_fn_with_state(
                    Arc::clone(&state),
                    signature::sign_response,
                ))
                .layer(from_fn_with_state(
                    Arc::clone(&state),
                    decrypt::decrypt_request,
                ))
                .layer(from_fn(gzip::gzip_layer)),
        )
        .with_state(state)
}
