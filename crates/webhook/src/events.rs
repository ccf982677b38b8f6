//! Human-readable Kubernetes events about reviewed objects.
//!
//! Handlers publish through [`EventRecorder`], which never blocks and never
//! fails from the caller's point of view. [`KubeEventRecorder`] hands events to
//! a background task that talks to the API server, so a slow or unavailable
//! API server cannot delay an admission decision.

use std::fmt;
use std::future::Future;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, Recorder, Reporter};
use kube::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Number of events that may wait for the API server before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Fire-and-forget sink for events about objects under review.
#[cfg_attr(test, mockall::automock)]
pub trait EventRecorder: Send + Sync {
    /// Queue `event` against `regarding`. Delivery is best effort.
    fn publish(&self, event: Event, regarding: ObjectReference);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventRecorder;

impl EventRecorder for NoopEventRecorder {
    fn publish(&self, _event: Event, _regarding: ObjectReference) {}
}

/// Publishes events to the cluster through a bounded queue.
#[derive(Debug, Clone)]
pub struct KubeEventRecorder {
    queue: mpsc::Sender<(Event, ObjectReference)>,
}

impl KubeEventRecorder {
    /// Start the publishing task and return a recorder feeding it.
    ///
    /// Once `cancel` fires the queue stops accepting events, and the ones
    /// already queued are still published before the task ends. Cancel it
    /// only after the server has drained so events from in-flight reviews
    /// are not lost. The task also ends when every recorder clone is dropped.
    pub fn spawn(
        client: Client,
        reporter: Reporter,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (queue, pending) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let recorder = Recorder::new(client, reporter);

        let handle = tokio::spawn(forward(pending, cancel, move |event, regarding| {
            let recorder = recorder.clone();
            async move { recorder.publish(&event, &regarding).await }
        }));

        (Self { queue }, handle)
    }
}

async fn forward<F, Fut, E>(
    mut pending: mpsc::Receiver<(Event, ObjectReference)>,
    cancel: CancellationToken,
    publish: F,
) where
    F: Fn(Event, ObjectReference) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    let mut closing = false;
    loop {
        let next = if closing {
            pending.recv().await
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    pending.close();
                    closing = true;
                    continue;
                }
                next = pending.recv() => next,
            }
        };
        let Some((event, regarding)) = next else {
            break;
        };

        let (reason, object) = (event.reason.clone(), regarding.name.clone());
        if let Err(e) = publish(event, regarding).await {
            warn!(%reason, ?object, error = %e, "failed to publish event");
        }
    }
    debug!("event recorder stopped");
}

impl EventRecorder for KubeEventRecorder {
    fn publish(&self, event: Event, regarding: ObjectReference) {
        if let Err(e) = self.queue.try_send((event, regarding)) {
            let (event, regarding) = match e {
                mpsc::error::TrySendError::Full(item) | mpsc::error::TrySendError::Closed(item) => {
                    item
                }
            };
            warn!(
                reason = %event.reason,
                object = ?regarding.name,
                "event queue unavailable; dropping event"
            );
        }
    }
}
