//! Route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use pulse_proto::{format_gauge, Metric, MetricKind, MetricPayload};

use crate::error::{ErrorBody, ServiceError};
use crate::index::render_index;
use crate::state::AppState;

fn json_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// `POST /update/{type}/{name}/{value}` — single update via URL,
/// plain-text errors.
pub async fn update_url(
    State(state): State<Arc<AppState>>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.service.update(&kind, &name, &value).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

/// `GET /value/{type}/{name}` — plain-text value.
///
/// Any failure here reads as "no such metric": a bad kind names a table
/// that cannot exist, so the endpoint answers a flat 404.
pub async fn value_url(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    match state.service.value(&kind, &name).await {
        Ok(value) => value.into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `POST /update/` — single JSON update; echoes the post-update record.
pub async fn update_json(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<MetricPayload>(&body) else {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid JSON format");
    };
    if payload.id.is_empty() || payload.kind.is_empty() {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "id and type are required");
    }
    let Ok(kind) = MetricKind::parse(&payload.kind) else {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid metric type");
    };
    let value_text = match kind {
        MetricKind::Counter => match payload.delta {
            Some(delta) => delta.to_string(),
            None => {
                return ErrorBody::response(
                    StatusCode::BAD_REQUEST,
                    "delta is required for counter",
                )
            }
        },
        MetricKind::Gauge => match payload.value {
            Some(value) => format_gauge(value),
            None => {
                return ErrorBody::response(StatusCode::BAD_REQUEST, "value is required for gauge")
            }
        },
    };

    if let Err(e) = state
        .service
        .update(kind.as_str(), &payload.id, &value_text)
        .await
    {
        return ErrorBody::response(e.status(), e.to_string());
    }

    match state.service.read_metric(kind, &payload.id).await {
        Ok(echo) => json_response(echo.render_json()),
        Err(_) => ErrorBody::response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to get updated value",
        ),
    }
}

/// `POST /value/` — JSON read; missing metrics (and missing fields)
/// surface as 404.
pub async fn value_json(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<MetricPayload>(&body) else {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid JSON format");
    };
    if payload.id.is_empty() || payload.kind.is_empty() {
        return ErrorBody::response(StatusCode::NOT_FOUND, "metric not found");
    }
    let Ok(kind) = MetricKind::parse(&payload.kind) else {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid metric type");
    };

    match state.service.read_metric(kind, &payload.id).await {
        Ok(metric) => json_response(metric.render_json()),
        Err(ServiceError::NotFound) => {
            ErrorBody::response(StatusCode::NOT_FOUND, "metric not found")
        }
        Err(e) => ErrorBody::response(e.status(), e.to_string()),
    }
}

/// `POST /updates/` — batch update; echoes the post-update records.
pub async fn updates_batch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(payloads) = serde_json::from_slice::<Vec<MetricPayload>>(&body) else {
        return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid JSON format");
    };

    let mut batch = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match payload.into_metric() {
            Ok(metric) => batch.push(metric),
            Err(e) => return ErrorBody::response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    match state.service.apply_batch(&batch).await {
        Ok(echoes) => json_response(Metric::render_json_array(&echoes)),
        Err(e) => ErrorBody::response(e.status(), e.to_string()),
    }
}

/// `GET /` — HTML index of every metric.
pub async fn index_page(State(state): State<Arc<AppState>>) -> Response {
    match state.service.all().await {
        Ok(entries) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            render_index(&entries),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /ping` — database health probe with a 2 s deadline.
pub async fn ping(State(state): State<Arc<AppState>>) -> Response {
    let Some(pool) = &state.db else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "database not configured",
        )
            .into_response();
    };

    match tokio::time::timeout(
        Duration::from_secs(2),
        sqlx::query("SELECT 1").execute(pool),
    )
    .await
    {
        Ok(Ok(_)) => (StatusCode::OK, "OK").into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("database ping error: {e}"),
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "database ping error: deadline exceeded",
        )
            .into_response(),
    }
}
