//! Common types, review envelope helpers, and errors shared across `admission-webhook` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::{ReviewExchange, ReviewRequest, ReviewResponse};
