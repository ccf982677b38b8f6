//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::certs::CertificateStore;
use crate::review::ReviewProcessor;

/// Application state shared across all request handlers.
///
/// Cloning is cheap: the processor is behind an `Arc` and the store is an
/// `Arc`-backed handle.
pub struct AppState<H> {
    /// Review lifecycle driver wrapping the configured decision handler.
    pub processor: Arc<ReviewProcessor<H>>,
    /// Active serving certificate, reported by the health endpoint.
    pub certificates: CertificateStore,
}

impl<H> AppState<H> {
    pub fn new(processor: ReviewProcessor<H>, certificates: CertificateStore) -> Self {
        Self {
            processor: Arc::new(processor),
            certificates,
        }
    }
}

// Manual impl: `H` itself need not be `Clone`.
impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            processor: self.processor.clone(),
            certificates: self.certificates.clone(),
        }
    }
}
