//! Errors answered at the HTTP layer.

use thiserror::Error;

/// Failures that cannot be expressed as a review denial and are answered
/// with a bare HTTP status instead.
///
/// - [`ServiceError::MalformedReview`] → 400
/// - [`ServiceError::Encode`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The body could not be read as an `AdmissionReview` envelope at all.
    #[error("malformed admission review: {0}")]
    MalformedReview(String),

    /// The answering envelope could not be serialized.
    #[error("failed to encode admission review: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::MalformedReview(_) => 400,
            ServiceError::Encode(_) => 500,
        }
    }

    /// Returns `true` when the caller sent something unusable.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}
