//! Polling watcher over the certificate and key files.
//!
//! Kubernetes projects secret volumes through a symlink that is swapped
//! atomically on rotation, which defeats watches on the file itself. Polling
//! the contents follows every swap regardless of how it was performed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::material::Fingerprint;
use super::store::CertificatePaths;

/// Notification emitted by [`CertificateWatcher`].
#[derive(Debug)]
pub enum WatchEvent {
    /// The contents of the certificate or key file changed.
    Updated,
    /// The files could not be read; the watcher keeps polling.
    Failed(WatchError),
}

/// A watched path could not be read.
#[derive(Debug, Error)]
#[error("failed to read {}: {source}", .path.display())]
pub struct WatchError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Polls between repeated reports of an unchanged read failure.
pub const FAILURE_REPORT_EVERY: u32 = 60;

/// Polls [`CertificatePaths`] and reports content changes.
///
/// The watcher never reads certificates for the store; it only tells the
/// reload task that something changed. The reload task re-reads the files
/// itself, so a burst of writes collapses into whatever is on disk when the
/// event is handled.
///
/// A read failure is reported when it first occurs and again every
/// [`FAILURE_REPORT_EVERY`] polls for as long as it persists.
#[derive(Debug)]
pub struct CertificateWatcher {
    paths: CertificatePaths,
    interval: Duration,
    last_seen: Option<Fingerprint>,
    failure: Option<FailureStreak>,
    report_every: u32,
}

#[derive(Debug)]
struct FailureStreak {
    path: PathBuf,
    kind: io::ErrorKind,
    polls: u32,
}

impl CertificateWatcher {
    pub fn new(paths: CertificatePaths, interval: Duration) -> Self {
        Self {
            paths,
            interval,
            last_seen: None,
            failure: None,
            report_every: FAILURE_REPORT_EVERY,
        }
    }

    /// Repeat the report of a persisting failure every `polls` polls.
    pub fn with_failure_report_every(mut self, polls: u32) -> Self {
        self.report_every = polls.max(1);
        self
    }

    /// Treat `fingerprint` as the contents already seen, typically the
    /// material loaded at startup.
    pub fn with_baseline(mut self, fingerprint: Fingerprint) -> Self {
        self.last_seen = Some(fingerprint);
        self
    }

    /// Poll until `cancel` fires or `events` is closed.
    pub async fn run(mut self, events: mpsc::Sender<WatchEvent>, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            cert = %self.paths.cert.display(),
            key = %self.paths.key.display(),
            interval_ms = self.interval.as_millis() as u64,
            "certificate watcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(event) = self.poll().await else {
                continue;
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = events.send(event) => {
                    if sent.is_err() {
                        debug!("watch event receiver dropped");
                        break;
                    }
                }
            }
        }

        debug!("certificate watcher stopped");
    }

    /// One poll: read both files and compare against the last digest.
    async fn poll(&mut self) -> Option<WatchEvent> {
        match fingerprint_files(&self.paths).await {
            Ok(fingerprint) => {
                self.failure = None;
                match self.last_seen.replace(fingerprint) {
                    Some(previous) if previous != fingerprint => Some(WatchEvent::Updated),
                    _ => None,
                }
            }
            Err(err) => {
                let kind = err.source.kind();
                match self.failure.as_mut() {
                    Some(streak) if streak.path == err.path && streak.kind == kind => {
                        streak.polls += 1;
                        if streak.polls % self.report_every != 0 {
                            return None;
                        }
                    }
                    _ => {
                        self.failure = Some(FailureStreak {
                            path: err.path.clone(),
                            kind,
                            polls: 0,
                        });
                    }
                }
                Some(WatchEvent::Failed(err))
            }
        }
    }
}

async fn fingerprint_files(paths: &CertificatePaths) -> Result<Fingerprint, WatchError> {
    let cert = read(&paths.cert).await?;
    let key = read(&paths.key).await?;
    Ok(Fingerprint::of(&cert, &key))
}

async fn read(path: &Path) -> Result<Vec<u8>, WatchError> {
    tokio::fs::read(path).await.map_err(|source| WatchError {
        path: path.to_path_buf(),
        source,
    })
}
