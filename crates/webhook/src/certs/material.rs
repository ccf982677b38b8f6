//! Parsed serving certificate material and the errors produced while parsing it.

use std::fmt;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced while reading or parsing certificate material.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// A certificate or key file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PEM data was malformed.
    #[error("failed to parse {what} PEM: {source}")]
    Pem {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The certificate PEM contained no `CERTIFICATE` blocks.
    #[error("no certificates found in PEM data")]
    NoCertificates,

    /// The key PEM contained no supported private key.
    #[error("no private key found in PEM data")]
    NoPrivateKey,

    /// rustls refused the certificate chain or key (unsupported algorithm,
    /// key not matching the certificate, ...).
    #[error("certificate rejected: {0}")]
    Rejected(#[from] rustls::Error),
}

/// SHA-256 digest over a certificate/key PEM pair.
///
/// Used to detect on-disk changes and to identify the active certificate in
/// logs without ever printing key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest of `cert_pem` and `key_pem`, each length-prefixed so that moving
    /// bytes between the two files changes the result.
    pub fn of(cert_pem: &[u8], key_pem: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        for part in [cert_pem, key_pem] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// PEM-encoded private key bytes, zeroed on drop and never printed.
struct KeyPem(Vec<u8>);

impl Drop for KeyPem {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// A parsed certificate chain and signing key, plus the PEM bytes it came from.
pub struct CertificateMaterial {
    certified_key: Arc<CertifiedKey>,
    cert_pem: Vec<u8>,
    key_pem: KeyPem,
    fingerprint: Fingerprint,
}

impl CertificateMaterial {
    /// Parse and validate a PEM certificate chain and private key.
    ///
    /// The key must be loadable by `provider` and its public half must match
    /// the leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if either PEM is malformed or empty, or
    /// if the provider cannot use the key with the certificate.
    pub fn from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
        provider: &Arc<CryptoProvider>,
    ) -> Result<Self, CertificateError> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CertificateError::Pem {
                what: "certificate",
                source,
            })?;
        if certs.is_empty() {
            return Err(CertificateError::NoCertificates);
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
            .map_err(|source| CertificateError::Pem {
                what: "private key",
                source,
            })?
            .ok_or(CertificateError::NoPrivateKey)?;

        let signing_key = provider.key_provider.load_private_key(key)?;
        let certified_key = CertifiedKey::new(certs, signing_key);
        certified_key.keys_match()?;

        Ok(Self {
            certified_key: Arc::new(certified_key),
            cert_pem: cert_pem.to_vec(),
            key_pem: KeyPem(key_pem.to_vec()),
            fingerprint: Fingerprint::of(cert_pem, key_pem),
        })
    }

    /// The chain and signing key handed to rustls during a handshake.
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        self.certified_key.clone()
    }

    /// The end-entity certificate presented to clients.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        // `from_pem` rejects empty chains.
        &self.certified_key.cert[0]
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem.0
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("chain_len", &self.certified_key.cert.len())
            .field("fingerprint", &self.fingerprint)
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}
