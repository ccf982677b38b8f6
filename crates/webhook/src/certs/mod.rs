//! Serving certificate loading, storage, and hot reload.
//!
//! # Lifecycle
//!
//! 1. At startup, [`CertificateStore::load`] reads the certificate and key from
//!    disk. Failure here aborts the process; there is nothing to serve with.
//! 2. The store is installed as the rustls certificate resolver, so every TLS
//!    handshake reads the active material through a lock-free pointer load.
//! 3. A [`CertificateWatcher`] polls the files and sends [`WatchEvent`]s to
//!    [`reload_task`], which re-reads and validates them and swaps them in.
//! 4. Material that fails validation is skipped; the previous certificate stays
//!    in service until a valid pair shows up.
//!
//! Established TLS sessions keep the certificate they negotiated; rotation
//! only affects new handshakes.

pub mod material;
pub mod store;
pub mod watcher;

pub use material::{CertificateError, CertificateMaterial, Fingerprint};
pub use store::{CertificatePaths, CertificateStore};
pub use watcher::{CertificateWatcher, WatchError, WatchEvent};

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the watcher → reload task channel.
const WATCH_EVENT_CAPACITY: usize = 16;

/// Spawn a task that applies [`WatchEvent`]s to `store`.
///
/// `Updated` re-reads `paths` and installs the result; a rejected pair is
/// logged and skipped. `Failed` is logged only. The task ends when `cancel`
/// fires or the sending side of `events` is dropped.
pub fn reload_task(
    mut events: mpsc::Receiver<WatchEvent>,
    store: CertificateStore,
    paths: CertificatePaths,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                WatchEvent::Updated => match store.reload(&paths).await {
                    Ok(material) => {
                        info!(fingerprint = %material.fingerprint(), "updated serving certificate")
                    }
                    Err(e) => warn!(
                        error = %e,
                        "skipping update as certificate could not be loaded from disk"
                    ),
                },
                WatchEvent::Failed(e) => warn!(error = %e, "certificate watcher failed"),
            }
        }
        debug!("certificate reload task stopped");
    })
}

/// Handles of the background tasks started by [`spawn_hot_reload`].
#[derive(Debug)]
pub struct HotReload {
    pub watcher: JoinHandle<()>,
    pub reloader: JoinHandle<()>,
}

/// Start a watcher on `paths` and a [`reload_task`] feeding `store`.
///
/// The watcher is seeded with the fingerprint of the currently active
/// material so the initial load is not reported as a change.
pub fn spawn_hot_reload(
    store: CertificateStore,
    paths: CertificatePaths,
    interval: Duration,
    cancel: CancellationToken,
) -> HotReload {
    let (tx, rx) = mpsc::channel(WATCH_EVENT_CAPACITY);

    let mut watcher = CertificateWatcher::new(paths.clone(), interval);
    if let Some(active) = store.get() {
        watcher = watcher.with_baseline(active.fingerprint());
    }

    HotReload {
        watcher: tokio::spawn(watcher.run(tx, cancel.clone())),
        reloader: reload_task(rx, store, paths, cancel),
    }
}
