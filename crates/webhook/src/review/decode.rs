//! Decoding of raw request bodies into review requests.

use kube::core::TypeMeta;
use serde_json::{json, Map, Value};
use thiserror::Error;

use common::protocol::{ReviewExchange, ReviewRequest, REVIEW_API_VERSION, REVIEW_KIND};

/// Reasons a request body could not be turned into a [`ReviewRequest`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not JSON at all.
    #[error("{0}")]
    Syntax(#[source] serde_json::Error),

    /// The body is JSON but not an object, so it cannot be an envelope.
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// The body is an object but does not have the shape of a review.
    #[error("{source}")]
    InvalidReview {
        uid: Option<String>,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope carried no `request`.
    #[error("admission review has no request")]
    MissingRequest,
}

impl DecodeError {
    /// UID of the request, when one could be extracted from the body.
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::InvalidReview { uid, .. } => uid.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` when the body could not be read as an envelope at all,
    /// as opposed to an envelope with invalid contents.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Syntax(_) | Self::NotAnObject(_))
    }
}

/// Decode `body` into the envelope's type information and its request.
///
/// Envelope and request fields that are absent or `null` take zero values;
/// fields that are present with the wrong type are still rejected.
///
/// # Errors
///
/// Returns a [`DecodeError`]; [`DecodeError::uid`] recovers the request UID
/// from bodies that were objects but failed to deserialize.
pub fn decode(body: &[u8]) -> Result<(TypeMeta, ReviewRequest), DecodeError> {
    let mut value: Value = serde_json::from_slice(body).map_err(DecodeError::Syntax)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject(json_type(&value)));
    }
    if let Some(envelope) = value.as_object_mut() {
        fill_absent_fields(envelope);
    }

    let uid = value
        .pointer("/request/uid")
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
        .map(str::to_owned);

    let review: ReviewExchange =
        serde_json::from_value(value).map_err(|source| DecodeError::InvalidReview { uid, source })?;
    let types = review.types.clone();
    let request: ReviewRequest = review
        .try_into()
        .map_err(|_| DecodeError::MissingRequest)?;

    Ok((types, request))
}

/// Give absent or `null` fields of the envelope and of its `request` the
/// zero values the API types cannot default themselves.
///
/// The operation defaults to `CREATE`. A `request` that is not an object is
/// left alone so it fails to decode.
fn fill_absent_fields(envelope: &mut Map<String, Value>) {
    set_if_absent(envelope, "apiVersion", json!(REVIEW_API_VERSION));
    set_if_absent(envelope, "kind", json!(REVIEW_KIND));

    let Some(request) = envelope.get_mut("request").and_then(Value::as_object_mut) else {
        return;
    };
    set_if_absent(request, "uid", json!(""));
    set_if_absent(request, "kind", json!({"group": "", "version": "", "kind": ""}));
    set_if_absent(
        request,
        "resource",
        json!({"group": "", "version": "", "resource": ""}),
    );
    set_if_absent(request, "operation", json!("CREATE"));
    set_if_absent(request, "userInfo", json!({}));
}

fn set_if_absent(object: &mut Map<String, Value>, field: &str, zero: Value) {
    match object.get_mut(field) {
        Some(Value::Null) | None => {
            object.insert(field.to_owned(), zero);
        }
        Some(_) => {}
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::review_json;

    #[test]
    fn decodes_valid_review() {
        let body = serde_json::to_vec(&review_json("abc")).unwrap();
        let (types, request) = decode(&body).unwrap();
        assert_eq!(types.kind, "AdmissionReview");
        assert_eq!(request.uid, "abc");
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = decode(b"{not json").unwrap_err();
        assert!(err.is_malformed());
        assert!(err.uid().is_none());
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn non_object_is_malformed() {
        let err = decode(b"[1, 2, 3]").unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(err.to_string(), "expected a JSON object, found an array");
    }

    #[test]
    fn invalid_review_keeps_uid() {
        let mut review = review_json("abc");
        review["request"]["operation"] = serde_json::json!(42);
        let body = serde_json::to_vec(&review).unwrap();

        let err = decode(&body).unwrap_err();
        assert!(!err.is_malformed());
        assert_eq!(err.uid(), Some("abc"));
    }

    #[test]
    fn minimal_envelope_takes_zero_values() {
        let body = br#"{"request":{"uid":"abc","object":{"apiVersion":"v1","kind":"Pod","metadata":{"name":"x"}}}}"#;
        let (types, request) = decode(body).unwrap();
        assert_eq!(types.api_version, REVIEW_API_VERSION);
        assert_eq!(types.kind, REVIEW_KIND);
        assert_eq!(request.uid, "abc");
        assert_eq!(request.operation, kube::core::admission::Operation::Create);
        assert!(request.kind.kind.is_empty());
        assert!(request.user_info.username.is_none());
        assert_eq!(request.object.unwrap().metadata.name.as_deref(), Some("x"));
    }

    #[test]
    fn null_fields_take_zero_values() {
        let body = br#"{"apiVersion":null,"request":{"uid":"abc","userInfo":null,"operation":null}}"#;
        let (types, request) = decode(body).unwrap();
        assert_eq!(types.api_version, REVIEW_API_VERSION);
        assert_eq!(request.operation, kube::core::admission::Operation::Create);
    }

    #[test]
    fn present_fields_keep_their_type_checks() {
        let body = br#"{"request":{"uid":"abc","userInfo":"admin"}}"#;
        let err = decode(body).unwrap_err();
        assert!(!err.is_malformed());
        assert_eq!(err.uid(), Some("abc"));
    }

    #[test]
    fn non_object_request_is_not_filled() {
        let err = decode(br#"{"request":5}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidReview { .. }));
    }

    #[test]
    fn non_string_uid_is_not_extracted() {
        let body = br#"{"request": {"uid": 7}}"#;
        let err = decode(body).unwrap_err();
        assert!(!err.is_malformed());
        assert!(err.uid().is_none());
    }

    #[test]
    fn missing_request_is_reported() {
        let body = br#"{"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}"#;
        let err = decode(body).unwrap_err();
        assert!(matches!(err, DecodeError::MissingRequest));
        assert!(!err.is_malformed());
    }
}
