//! [`CertificateStore`]: the active serving certificate, shared with rustls.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tracing::debug;

use super::material::{CertificateError, CertificateMaterial};

/// Locations of the certificate chain and private key on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertificatePaths {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Read both files, certificate first.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Read`] naming the file that failed.
    pub async fn read(&self) -> Result<(Vec<u8>, Vec<u8>), CertificateError> {
        let cert = read_file(&self.cert).await?;
        let key = read_file(&self.key).await?;
        Ok((cert, key))
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, CertificateError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| CertificateError::Read {
            path: path.to_path_buf(),
            source,
        })
}

struct Inner {
    active: ArcSwapOption<CertificateMaterial>,
    // Held across parse and swap so updates never interleave.
    writer: Mutex<()>,
    provider: Arc<CryptoProvider>,
}

/// Thread-safe holder of the active [`CertificateMaterial`].
///
/// Cloning is cheap; all clones share the same state. Readers (TLS handshakes,
/// the health endpoint) go through an atomic pointer load and never block, so
/// a rotation cannot stall a handshake. Writers validate new material before
/// touching shared state, which means a failed update leaves the previous
/// certificate in service.
#[derive(Clone)]
pub struct CertificateStore {
    inner: Arc<Inner>,
}

impl CertificateStore {
    /// Create an empty store that validates material with the `ring` provider.
    pub fn new() -> Self {
        Self::with_provider(Arc::new(rustls::crypto::ring::default_provider()))
    }

    /// Create an empty store that validates material with `provider`.
    pub fn with_provider(provider: Arc<CryptoProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                active: ArcSwapOption::empty(),
                writer: Mutex::new(()),
                provider,
            }),
        }
    }

    /// Crypto provider used to validate material; TLS configurations serving
    /// from this store should use the same one.
    pub fn provider(&self) -> Arc<CryptoProvider> {
        self.inner.provider.clone()
    }

    /// Read, parse, and install the initial certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if either file cannot be read or the
    /// pair does not parse. Callers treat this as fatal at startup.
    pub async fn load(
        &self,
        paths: &CertificatePaths,
    ) -> Result<Arc<CertificateMaterial>, CertificateError> {
        self.reload(paths).await
    }

    /// Re-read the current file contents and [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load); the active certificate is untouched on
    /// failure.
    pub async fn reload(
        &self,
        paths: &CertificatePaths,
    ) -> Result<Arc<CertificateMaterial>, CertificateError> {
        let (cert_pem, key_pem) = paths.read().await?;
        self.update(&cert_pem, &key_pem)
    }

    /// Validate `cert_pem`/`key_pem` and, only if they are usable, make them
    /// the active certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] describing why the pair was rejected.
    pub fn update(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Arc<CertificateMaterial>, CertificateError> {
        let _writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let material = Arc::new(CertificateMaterial::from_pem(
            cert_pem,
            key_pem,
            &self.inner.provider,
        )?);
        self.inner.active.store(Some(material.clone()));

        debug!(fingerprint = %material.fingerprint(), "active certificate replaced");
        Ok(material)
    }

    /// The active certificate, or `None` before the first successful load.
    pub fn get(&self) -> Option<Arc<CertificateMaterial>> {
        self.inner.active.load_full()
    }

    /// Returns `true` once a certificate has been installed.
    pub fn is_loaded(&self) -> bool {
        self.inner.active.load().is_some()
    }
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateStore")
            .field(
                "fingerprint",
                &self.get().map(|material| material.fingerprint()),
            )
            .finish()
    }
}

impl ResolvesServerCert for CertificateStore {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let material = self.get();
        if material.is_none() {
            debug!("handshake attempted before a certificate was loaded");
        }
        material.map(|material| material.certified_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::Fingerprint;
    use crate::testing::generate_pair;

    #[test]
    fn initially_empty() {
        let store = CertificateStore::new();
        assert!(!store.is_loaded());
        assert!(store.get().is_none());
    }

    #[test]
    fn update_then_get_returns_same_material() {
        let store = CertificateStore::new();
        let (cert, key) = generate_pair("a.webhook.svc");
        let installed = store.update(&cert, &key).unwrap();

        let active = store.get().unwrap();
        assert!(Arc::ptr_eq(&installed, &active));
        assert_eq!(active.cert_pem(), cert.as_slice());
        assert_eq!(active.key_pem(), key.as_slice());
        assert!(store.is_loaded());
    }

    #[test]
    fn rejected_update_keeps_previous_material() {
        let store = CertificateStore::new();
        let (cert, key) = generate_pair("a.webhook.svc");
        store.update(&cert, &key).unwrap();
        let before = store.get().unwrap().fingerprint();

        assert!(store.update(b"garbage", &key).is_err());
        assert!(store.update(&cert, b"garbage").is_err());
        assert!(store.update(b"", b"").is_err());

        assert_eq!(store.get().unwrap().fingerprint(), before);
    }

    #[test]
    fn rejected_update_on_empty_store_stays_empty() {
        let store = CertificateStore::new();
        assert!(store.update(b"garbage", b"garbage").is_err());
        assert!(!store.is_loaded());
    }

    #[test]
    fn concurrent_readers_see_whole_materials() {
        let store = CertificateStore::new();
        let (cert_a, key_a) = generate_pair("a.webhook.svc");
        let (cert_b, key_b) = generate_pair("b.webhook.svc");
        let a = Fingerprint::of(&cert_a, &key_a);
        let b = Fingerprint::of(&cert_b, &key_b);
        store.update(&cert_a, &key_a).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        let material = store.get().unwrap();
                        let seen = Fingerprint::of(material.cert_pem(), material.key_pem());
                        assert_eq!(seen, material.fingerprint());
                        assert!(seen == a || seen == b);
                    }
                });
            }
            scope.spawn(|| store.update(&cert_b, &key_b).unwrap());
        });

        assert_eq!(store.get().unwrap().fingerprint(), b);
    }

    #[tokio::test]
    async fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CertificatePaths::new(dir.path().join("tls.crt"), dir.path().join("tls.key"));
        let (cert, key) = generate_pair("a.webhook.svc");
        std::fs::write(&paths.cert, &cert).unwrap();
        std::fs::write(&paths.key, &key).unwrap();

        let store = CertificateStore::new();
        let material = store.load(&paths).await.unwrap();
        assert_eq!(material.fingerprint(), Fingerprint::of(&cert, &key));
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CertificatePaths::new(dir.path().join("tls.crt"), dir.path().join("tls.key"));

        let store = CertificateStore::new();
        let err = store.load(&paths).await.unwrap_err();
        match err {
            CertificateError::Read { path, .. } => assert_eq!(path, paths.cert),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.is_loaded());
    }

    #[test]
    fn resolver_serves_active_key() {
        let store = CertificateStore::new();
        let (cert, key) = generate_pair("a.webhook.svc");
        let material = store.update(&cert, &key).unwrap();
        let resolved = store.get().map(|m| m.certified_key()).unwrap();
        assert_eq!(resolved.cert[0], *material.leaf());
    }
}
