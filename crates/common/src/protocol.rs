//! Review envelope types exchanged with the Kubernetes API server.
//!
//! The wire unit is the `AdmissionReview` envelope: the API server sends one
//! with `request` populated and expects the same envelope back with `response`
//! populated. The aliases below pin the object type to [`DynamicObject`] so the
//! webhook never needs to know which resource kinds it is registered for.

use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};
use serde::{Deserialize, Serialize};

/// The envelope exchanged with the API server.
pub type ReviewExchange = AdmissionReview<DynamicObject>;

/// The request half of an exchange, as handed to decision handlers.
pub type ReviewRequest = AdmissionRequest<DynamicObject>;

/// The decision half of an exchange, as returned by decision handlers.
pub type ReviewResponse = AdmissionResponse;

/// `apiVersion` written on envelopes that carry no request type information.
pub const REVIEW_API_VERSION: &str = "admission.k8s.io/v1";

/// `kind` written on envelopes that carry no request type information.
pub const REVIEW_KIND: &str = "AdmissionReview";

/// Media type of encoded envelopes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// Envelope construction
// ---------------------------------------------------------------------------

/// Type information for an `admission.k8s.io/v1` envelope.
pub fn envelope_types() -> TypeMeta {
    TypeMeta {
        api_version: REVIEW_API_VERSION.to_owned(),
        kind: REVIEW_KIND.to_owned(),
    }
}

/// A denial carrying `message` as its result, echoing `uid` when one is known.
pub fn denial(uid: Option<&str>, message: impl Into<String>) -> ReviewResponse {
    let mut response = AdmissionResponse::invalid(message.into());
    if let Some(uid) = uid {
        response.uid = uid.to_owned();
    }
    response
}

/// Wrap `response` in an envelope.
///
/// `types` should be the type information of the incoming envelope so the
/// answer uses the same `admission.k8s.io` version; when the request could not
/// be decoded, `None` falls back to [`envelope_types`].
pub fn into_exchange(response: ReviewResponse, types: Option<TypeMeta>) -> ReviewExchange {
    let mut review = response.into_review();
    review.types = match types {
        Some(types) if !types.api_version.is_empty() => types,
        _ => envelope_types(),
    };
    review
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether a serving certificate is currently loaded.
    pub certificate_loaded: bool,
    /// SHA-256 fingerprint of the active certificate material, hex encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_fingerprint: Option<String>,
}
