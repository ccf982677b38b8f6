//! HTTPS server, routing, and middleware.
//!
//! # Responsibilities
//! - Bind the TLS listener whose certificate resolver is the
//!   [`CertificateStore`](crate::certs::CertificateStore).
//! - Define the Axum router with the review and health routes and shared
//!   middleware.
//! - Serve each connection on its own task and drain them on shutdown.

pub mod handlers;
pub mod listener;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;

pub use listener::{Server, ShutdownHandle};
pub use state::AppState;
