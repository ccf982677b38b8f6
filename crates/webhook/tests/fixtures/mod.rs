//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use admission_webhook::certs::CertificateStore;
use admission_webhook::events::NoopEventRecorder;
use admission_webhook::review::{ReviewHandler, ReviewProcessor};
use admission_webhook::server::router::{self, RouterOptions};
use admission_webhook::server::{AppState, Server};
use axum::Router;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub const SERVER_NAME: &str = "webhook.default.svc";

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

/// Kubernetes client pointed at an address nothing listens on.
pub fn test_client() -> kube::Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
    kube::Client::try_from(config).unwrap()
}

pub fn test_router<H: ReviewHandler>(handler: H, store: CertificateStore) -> Router {
    let processor = ReviewProcessor::new(handler, test_client(), Arc::new(NoopEventRecorder));
    router::build(AppState::new(processor, store), &RouterOptions::default())
}

/// Bind a server on an ephemeral local port.
pub async fn bind_server(store: &CertificateStore, router: Router) -> (Server, SocketAddr) {
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), store, router)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
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
            "userInfo": {"username": "kubernetes-admin"},
            "object": {
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "settings", "namespace": "default", "labels": {"app": "web"}},
                "data": {"mode": "production"}
            },
            "dryRun": false
        }
    })
}

/// Accepts whatever certificate the server presents; tests compare the
/// presented certificate against the expected one instead.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn client_config() -> Arc<ClientConfig> {
    let provider = ring_provider();
    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Open a TLS connection to `addr`.
pub async fn connect(addr: SocketAddr) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from(SERVER_NAME).unwrap().to_owned();
    TlsConnector::from(client_config()).connect(name, tcp).await
}

/// Certificate the server presents in a fresh handshake.
pub async fn presented_leaf(addr: SocketAddr) -> CertificateDer<'static> {
    try_presented_leaf(addr)
        .await
        .expect("handshake should succeed")
}

/// Like [`presented_leaf`], but `None` when the handshake fails.
pub async fn try_presented_leaf(addr: SocketAddr) -> Option<CertificateDer<'static>> {
    let stream = connect(addr).await.ok()?;
    let (_, session) = stream.get_ref();
    session.peer_certificates()?.first().cloned()
}

/// Lay out `tls.crt` and `tls.key` in `dir` the way the kubelet projects a
/// secret volume: each file is a symlink through `..data`, which points at a
/// versioned directory and is replaced atomically on every update.
#[cfg(unix)]
pub fn project_secret(dir: &Path, version: &str, cert_pem: &[u8], key_pem: &[u8]) {
    use std::os::unix::fs::symlink;

    let versioned = dir.join(version);
    std::fs::create_dir(&versioned).unwrap();
    std::fs::write(versioned.join("tls.crt"), cert_pem).unwrap();
    std::fs::write(versioned.join("tls.key"), key_pem).unwrap();

    let staged = dir.join("..data_tmp");
    symlink(version, &staged).unwrap();
    std::fs::rename(&staged, dir.join("..data")).unwrap();

    for file in ["tls.crt", "tls.key"] {
        let link = dir.join(file);
        if std::fs::symlink_metadata(&link).is_err() {
            symlink(Path::new("..data").join(file), &link).unwrap();
        }
    }
}
