//! Axum request handlers for all service endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{HealthResponse, ReviewExchange, JSON_CONTENT_TYPE};
use common::ServiceError;
use tracing::error;

use super::state::AppState;
use crate::review::{Processed, ReviewHandler};

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// `POST <webhook path>`: run one review exchange.
///
/// - empty body → `200 OK` with no body;
/// - body that is not an envelope → `400 Bad Request`, plain text;
/// - anything else → `200 OK` with the answering review envelope.
pub async fn review<H: ReviewHandler>(State(state): State<AppState<H>>, body: Bytes) -> Response {
    match state.processor.process(&body).await {
        Processed::Skipped => StatusCode::OK.into_response(),
        Processed::Answered(review) => encode(&review),
        Processed::Malformed { reason, .. } => {
            error_response(ServiceError::MalformedReview(reason))
        }
    }
}

/// `GET /health`: readiness check.
///
/// Returns `200 OK` once a serving certificate is loaded and
/// `503 Service Unavailable` before that.
pub async fn health<H: ReviewHandler>(State(state): State<AppState<H>>) -> Response {
    let active = state.certificates.get();

    let (status_code, status_str) = if active.is_some() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        certificate_loaded: active.is_some(),
        certificate_fingerprint: active.map(|m| m.fingerprint().to_string()),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        "the requested resource does not exist",
    )
}

fn encode(review: &ReviewExchange) -> Response {
    match serde_json::to_vec(review) {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            let err = ServiceError::from(e);
            error!(error = %err, "failed to answer admission review");
            error_response(err)
        }
    }
}

fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(CONTENT_TYPE, TEXT_CONTENT_TYPE)], err.to_string()).into_response()
}
