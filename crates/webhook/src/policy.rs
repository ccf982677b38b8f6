//! Decision handlers shipped with the binary.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::admission::Operation;
use kube::runtime::events::{Event, EventType};
use tracing::info;

use common::protocol::{ReviewRequest, ReviewResponse};

use crate::review::{ReviewContext, ReviewHandler};

/// Reason attached to events recorded for rejected objects.
pub const MISSING_LABELS_REASON: &str = "MissingLabels";

/// Admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ReviewHandler for AllowAll {
    async fn review(
        &self,
        _ctx: ReviewContext,
        request: ReviewRequest,
    ) -> anyhow::Result<ReviewResponse> {
        Ok(ReviewResponse::from(&request))
    }
}

/// Rejects created or updated objects that lack any of `labels`.
///
/// Each rejection is also recorded as a `Warning` event on the object so it
/// shows up in `kubectl describe`.
#[derive(Debug, Clone, Default)]
pub struct RequireLabels {
    pub labels: Vec<String>,
}

impl RequireLabels {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    fn missing(&self, request: &ReviewRequest) -> Vec<&str> {
        let Some(object) = request.object.as_ref() else {
            return Vec::new();
        };
        let present = object.metadata.labels.as_ref();
        self.labels
            .iter()
            .filter(|key| !present.is_some_and(|labels| labels.contains_key(key.as_str())))
            .map(String::as_str)
            .collect()
    }
}

impl ReviewHandler for RequireLabels {
    async fn review(
        &self,
        ctx: ReviewContext,
        request: ReviewRequest,
    ) -> anyhow::Result<ReviewResponse> {
        if !matches!(request.operation, Operation::Create | Operation::Update) {
            return Ok(ReviewResponse::from(&request));
        }

        let missing = self.missing(&request);
        if missing.is_empty() {
            return Ok(ReviewResponse::from(&request));
        }

        let message = format!("missing required labels: {}", missing.join(", "));
        info!(uid = %request.uid, name = %request.name, %message, "denying admission request");

        ctx.recorder.publish(
            Event {
                type_: EventType::Warning,
                reason: MISSING_LABELS_REASON.into(),
                note: Some(message.clone()),
                action: "Admit".into(),
                secondary: None,
            },
            object_reference(&request),
        );

        Ok(ReviewResponse::from(&request).deny(message))
    }
}

/// Built-in policy selected by configuration.
#[derive(Debug, Clone)]
pub enum Policy {
    AllowAll(AllowAll),
    RequireLabels(RequireLabels),
}

impl Policy {
    /// `RequireLabels` when `labels` is non-empty, `AllowAll` otherwise.
    pub fn from_labels(labels: Vec<String>) -> Self {
        if labels.is_empty() {
            Self::AllowAll(AllowAll)
        } else {
            Self::RequireLabels(RequireLabels::new(labels))
        }
    }
}

impl ReviewHandler for Policy {
    async fn review(
        &self,
        ctx: ReviewContext,
        request: ReviewRequest,
    ) -> anyhow::Result<ReviewResponse> {
        match self {
            Self::AllowAll(policy) => policy.review(ctx, request).await,
            Self::RequireLabels(policy) => policy.review(ctx, request).await,
        }
    }
}

/// Reference to the object under review, for attaching events.
fn object_reference(request: &ReviewRequest) -> ObjectReference {
    let api_version = if request.kind.group.is_empty() {
        request.kind.version.clone()
    } else {
        format!("{}/{}", request.kind.group, request.kind.version)
    };
    let metadata = request.object.as_ref().map(|object| &object.metadata);
    let name = Some(request.name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| metadata.and_then(|m| m.name.clone()))
        .or_else(|| metadata.and_then(|m| m.generate_name.clone()));

    ObjectReference {
        api_version: Some(api_version),
        kind: Some(request.kind.kind.clone()),
        name,
        namespace: request.namespace.clone(),
        uid: metadata.and_then(|m| m.uid.clone()),
        resource_version: metadata.and_then(|m| m.resource_version.clone()),
        ..ObjectReference::default()
    }
}
