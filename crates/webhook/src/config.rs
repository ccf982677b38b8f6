//! Configuration loading and validation for the webhook server.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is present but invalid.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Route served by the health handler; the review route must not shadow it.
pub const HEALTH_PATH: &str = "/health";

/// Validated webhook server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTPS server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path of the review endpoint (`POST`).
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Filesystem path to the PEM-encoded certificate chain, usually mounted
    /// from a `kubernetes.io/tls` secret.
    #[serde(default = "default_tls_cert_path")]
    pub tls_cert_path: PathBuf,

    /// Filesystem path to the PEM-encoded private key.
    #[serde(default = "default_tls_key_path")]
    pub tls_key_path: PathBuf,

    /// How often (milliseconds) the certificate files are checked for changes.
    #[serde(default = "default_cert_poll_interval")]
    pub cert_poll_interval_ms: u64,

    /// Upper bound (seconds) on a single review request, handler included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long (seconds) in-flight requests may take to drain on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Component name reported on Kubernetes events.
    #[serde(default = "default_component_name")]
    pub component_name: String,

    /// Pod name reported as the event reporter instance, usually injected
    /// through the downward API.
    #[serde(default)]
    pub pod_name: Option<String>,

    /// Comma-separated label keys every admitted object must carry. Empty
    /// admits everything.
    #[serde(default)]
    pub required_labels: String,

    /// OTLP endpoint for span export. Tracing stays local when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 8443).into()
}
fn default_webhook_path() -> String {
    "/".into()
}
fn default_tls_cert_path() -> PathBuf {
    "/var/run/webhook/tls/tls.crt".into()
}
fn default_tls_key_path() -> PathBuf {
    "/var/run/webhook/tls/tls.key".into()
}
fn default_cert_poll_interval() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    10
}
fn default_component_name() -> String {
    "admission-webhook".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            webhook_path: default_webhook_path(),
            tls_cert_path: default_tls_cert_path(),
            tls_key_path: default_tls_key_path(),
            cert_poll_interval_ms: default_cert_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            component_name: default_component_name(),
            pod_name: None,
            required_labels: String::new(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.tls_cert_path.to_string_lossy(), "TLS_CERT_PATH")?;
        ensure_non_empty(&self.tls_key_path.to_string_lossy(), "TLS_KEY_PATH")?;
        ensure_non_empty(&self.component_name, "COMPONENT_NAME")?;

        if !self.webhook_path.starts_with('/') {
            anyhow::bail!("WEBHOOK_PATH must start with '/' (got {:?})", self.webhook_path);
        }
        if self.webhook_path == HEALTH_PATH {
            anyhow::bail!("WEBHOOK_PATH must not be {HEALTH_PATH}");
        }
        if self.cert_poll_interval_ms == 0 {
            anyhow::bail!("CERT_POLL_INTERVAL_MS must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }

    pub fn cert_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cert_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Label keys parsed from `REQUIRED_LABELS`, blanks dropped.
    pub fn required_label_keys(&self) -> Vec<String> {
        self.required_labels
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
