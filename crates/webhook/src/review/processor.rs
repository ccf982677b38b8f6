//! [`ReviewProcessor`]: decode, dispatch, and encode one review exchange.

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::protocol::{denial, into_exchange, ReviewExchange};

use super::decode::decode;
use super::handler::{ReviewContext, ReviewHandler};
use crate::events::EventRecorder;

/// Outcome of processing one request body.
#[derive(Debug)]
pub enum Processed {
    /// The body was empty; nothing is written back.
    Skipped,
    /// A review envelope to return with `200 OK`. Covers allowed and denied
    /// requests, handler failures, and envelopes with invalid contents.
    Answered(ReviewExchange),
    /// The body could not be read as an envelope at all. `review` holds the
    /// synthesized denial; `reason` is the decode error.
    Malformed {
        reason: String,
        review: ReviewExchange,
    },
}

/// Drives a request body through decoding, the decision handler, and
/// envelope construction.
///
/// Every failure past this point is converted into a denial; nothing a
/// client sends, and nothing a handler returns, escapes as an error.
pub struct ReviewProcessor<H> {
    handler: H,
    client: Client,
    recorder: Arc<dyn EventRecorder>,
}

impl<H: ReviewHandler> ReviewProcessor<H> {
    pub fn new(handler: H, client: Client, recorder: Arc<dyn EventRecorder>) -> Self {
        Self {
            handler,
            client,
            recorder,
        }
    }

    /// Process one request body.
    ///
    /// The handler's cancellation token is cancelled if the returned future
    /// is dropped before completion.
    pub async fn process(&self, body: &[u8]) -> Processed {
        if body.is_empty() {
            warn!("received empty payload");
            return Processed::Skipped;
        }

        let (types, request) = match decode(body) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "failed to decode admission review");
                let review = into_exchange(denial(e.uid(), e.to_string()), None);
                return if e.is_malformed() {
                    Processed::Malformed {
                        reason: e.to_string(),
                        review,
                    }
                } else {
                    Processed::Answered(review)
                };
            }
        };

        let uid = request.uid.clone();
        info!(uid = %uid, "received admission review request");
        debug!(
            uid = %uid,
            operation = ?request.operation,
            namespace = ?request.namespace,
            name = %request.name,
            "admission request"
        );

        let cancel = CancellationToken::new();
        let _abandoned = cancel.clone().drop_guard();
        let ctx = ReviewContext {
            cancel,
            client: self.client.clone(),
            recorder: self.recorder.clone(),
        };

        let response = match self.handler.review(ctx, request).await {
            Ok(response) => response,
            Err(e) => {
                let message = format!("{e:#}");
                error!(uid = %uid, error = %message, "failed to run review handler");
                denial(Some(&uid), message)
            }
        };

        Processed::Answered(into_exchange(response, Some(types)))
    }
}
