//! Axum router construction.

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};
use crate::config::HEALTH_PATH;
use crate::review::ReviewHandler;

/// Route settings taken from configuration.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Path of the review endpoint.
    pub webhook_path: String,
    /// Upper bound on one request, handler included.
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            webhook_path: "/".into(),
            request_timeout: middleware::REQUEST_TIMEOUT,
        }
    }
}

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build<H: ReviewHandler>(state: AppState<H>, options: &RouterOptions) -> Router {
    Router::new()
        .route(&options.webhook_path, post(handlers::review::<H>))
        .route(HEALTH_PATH, get(handlers::health::<H>))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(middleware::MAX_BODY_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
