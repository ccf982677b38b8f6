//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - **No key material** may appear in any span attribute or log field; the
//!   certificate store only ever logs fingerprints.
//! - Spans still buffered at exit are flushed when the [`TelemetryGuard`]
//!   returned by [`init_telemetry`] is dropped.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden by
//!   `RUST_LOG` when set.

pub mod init;

pub use init::{init_telemetry, TelemetryGuard};
