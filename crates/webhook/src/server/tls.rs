//! rustls server configuration backed by the certificate store.

use std::sync::Arc;

use rustls::ServerConfig;

use crate::certs::CertificateStore;

/// ALPN protocols offered to clients, most preferred first.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Build a [`rustls::ServerConfig`] that asks `store` for the certificate on
/// every handshake.
///
/// The configuration never holds certificate material itself, so it stays
/// valid across rotations.
///
/// # Errors
///
/// Returns an error if the store's crypto provider supports none of the
/// default protocol versions.
pub fn build_server_config(store: &CertificateStore) -> Result<Arc<ServerConfig>, rustls::Error> {
    let mut config = ServerConfig::builder_with_provider(store.provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(store.clone()));

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}
