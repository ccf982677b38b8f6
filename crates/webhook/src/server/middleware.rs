//! Limits applied by the router's middleware layers.
//!
//! Tracing, timeout enforcement, panic isolation, and body size limits are
//! attached in [`router::build`](super::router::build).

use std::time::Duration;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest request body accepted. The API server caps review payloads well
/// below this.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on a TLS handshake before the connection is dropped.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
