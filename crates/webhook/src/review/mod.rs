//! The review request lifecycle.
//!
//! A request body moves through these states:
//!
//! ```text
//! Received ─┬─ empty ───────────────────────────────► Skipped
//!           └─ decode ─┬─ not an envelope ─────────► Malformed (400)
//!                      ├─ invalid envelope ────────► denial ─┐
//!                      └─ Decoded ─► handler ─┬─ Ok ─────────┼─► Answered (200)
//!                                             └─ Err ─ denial┘
//! ```
//!
//! The processor owns no policy. Decisions come from a [`ReviewHandler`]
//! supplied at construction.

pub mod decode;
pub mod handler;
pub mod processor;

pub use decode::DecodeError;
pub use handler::{ReviewContext, ReviewHandler};
pub use processor::{Processed, ReviewProcessor};
