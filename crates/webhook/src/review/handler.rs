//! The decision handler capability injected into the processor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use common::protocol::{ReviewRequest, ReviewResponse};

use crate::events::EventRecorder;

/// Everything a handler may use besides the request itself.
#[derive(Clone)]
pub struct ReviewContext {
    /// Cancelled when the HTTP request is abandoned (client disconnect or
    /// request timeout). Long-running handlers should select on it.
    pub cancel: CancellationToken,
    /// Client for the cluster API.
    pub client: Client,
    /// Sink for human-readable events about reviewed objects.
    pub recorder: Arc<dyn EventRecorder>,
}

impl fmt::Debug for ReviewContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Decides the outcome of a single review.
///
/// Returning `Err` is not fatal: the processor turns it into a denial that
/// carries the error chain as its message. Returning `Ok` forwards the
/// response as-is, so implementations are responsible for echoing the
/// request UID (`AdmissionResponse::from(&request)` does).
///
/// Implemented for async closures and functions of the matching shape:
///
/// ```ignore
/// let handler = |_ctx: ReviewContext, request: ReviewRequest| async move {
///     Ok::<_, anyhow::Error>(ReviewResponse::from(&request))
/// };
/// ```
pub trait ReviewHandler: Send + Sync + 'static {
    fn review(
        &self,
        ctx: ReviewContext,
        request: ReviewRequest,
    ) -> impl Future<Output = anyhow::Result<ReviewResponse>> + Send;
}

impl<F, Fut> ReviewHandler for F
where
    F: Fn(ReviewContext, ReviewRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ReviewResponse>> + Send,
{
    fn review(
        &self,
        ctx: ReviewContext,
        request: ReviewRequest,
    ) -> impl Future<Output = anyhow::Result<ReviewResponse>> + Send {
        self(ctx, request)
    }
}
