//! Kubernetes admission webhook server.
//!
//! Serves `AdmissionReview` requests over HTTPS, hands each one to a
//! [`ReviewHandler`](review::ReviewHandler), and keeps its serving certificate
//! current by watching the mounted certificate files.
//!
//! Wiring, leaves first:
//! - [`certs`]: certificate store, file watcher, reload task.
//! - [`review`]: decode, dispatch, encode a single review.
//! - [`events`]: Kubernetes event publishing for handlers.
//! - [`policy`]: decision handlers shipped with the binary.
//! - [`server`]: TLS listener, router, graceful shutdown.

pub mod certs;
pub mod config;
pub mod events;
pub mod policy;
pub mod review;
pub mod server;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rustls::crypto::CryptoProvider;

    use crate::certs::CertificateStore;
    use crate::events::NoopEventRecorder;
    use crate::review::{ReviewHandler, ReviewProcessor};
    use crate::server::AppState;

    /// Self-signed certificate and PKCS#8 key for `name`, both PEM encoded.
    pub fn generate_pair(name: &str) -> (Vec<u8>, Vec<u8>) {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec![name.to_owned()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        (cert.pem().into_bytes(), key_pair.serialize_pem().into_bytes())
    }

    pub fn ring_provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::ring::default_provider())
    }

    /// Client pointed at an address nothing listens on. Requires a runtime.
    pub fn test_client() -> kube::Client {
        // Another test may have installed it already.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        kube::Client::try_from(config).unwrap()
    }

    pub fn test_state<H: ReviewHandler>(handler: H) -> AppState<H> {
        AppState::new(
            ReviewProcessor::new(handler, test_client(), Arc::new(NoopEventRecorder)),
            CertificateStore::new(),
        )
    }

    /// A `CREATE` review of a labelled ConfigMap.
    pub fn review_json(uid: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": uid,
                "kind": {"group": "", "version": "v1", "kind": "ConfigMap"},
                "resource": {"group": "", "version": "v1", "resource": "configmaps"},
                "name": "settings",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {"username": "kubernetes-admin", "groups": ["system:masters"]},
                "object": {
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {
                        "name": "settings",
                        "namespace": "default",
                        "labels": {"app": "web"}
                    },
                    "data": {"mode": "production"}
                },
                "oldObject": null,
                "dryRun": false
            }
        })
    }
}
