//! `admission-webhook`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (OTEL + tracing).
//! 3. Install the process-wide rustls crypto provider.
//! 4. Build the Kubernetes client and event recorder.
//! 5. Load the serving certificate into [`CertificateStore`].
//! 6. Spawn background tasks: certificate watcher and reload task.
//! 7. Build the Axum router and start the TLS server.
//! 8. On SIGTERM/SIGINT, stop certificate tasks, drain connections, then
//!    flush queued events.

use anyhow::{Context, Result};
use kube::runtime::events::Reporter;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use admission_webhook::certs::{self, CertificatePaths, CertificateStore};
use admission_webhook::config::Config;
use admission_webhook::events::KubeEventRecorder;
use admission_webhook::policy::Policy;
use admission_webhook::review::ReviewProcessor;
use admission_webhook::server::router::{self, RouterOptions};
use admission_webhook::server::{AppState, Server};
use admission_webhook::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    let telemetry =
        telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        span_export = telemetry.is_exporting(),
        addr = %cfg.listen_addr,
        webhook_path = %cfg.webhook_path,
        "admission-webhook starting"
    );

    // -----------------------------------------------------------------------
    // 3. Crypto provider
    // -----------------------------------------------------------------------
    // The Kubernetes client builds its own rustls configuration from the
    // process default; pin it to the provider the server uses.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("a rustls crypto provider was already installed");
    }

    // -----------------------------------------------------------------------
    // 4. Kubernetes client and event recorder
    // -----------------------------------------------------------------------
    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;

    // Outlives the server drain so events from in-flight reviews still go out.
    let events_cancel = CancellationToken::new();
    let reporter = Reporter {
        controller: cfg.component_name.clone(),
        instance: cfg.pod_name.clone(),
    };
    let (recorder, recorder_task) =
        KubeEventRecorder::spawn(client.clone(), reporter, events_cancel.clone());

    // -----------------------------------------------------------------------
    // 5. Serving certificate
    // -----------------------------------------------------------------------
    let paths = CertificatePaths::new(&cfg.tls_cert_path, &cfg.tls_key_path);
    let store = CertificateStore::new();
    let material = store
        .load(&paths)
        .await
        .context("failed to load initial serving certificate")?;
    info!(fingerprint = %material.fingerprint(), "serving certificate loaded");

    // -----------------------------------------------------------------------
    // 6. Background tasks
    // -----------------------------------------------------------------------
    let background = CancellationToken::new();
    let hot_reload = certs::spawn_hot_reload(
        store.clone(),
        paths,
        cfg.cert_poll_interval(),
        background.clone(),
    );

    // -----------------------------------------------------------------------
    // 7. HTTPS server
    // -----------------------------------------------------------------------
    let policy = Policy::from_labels(cfg.required_label_keys());
    info!(policy = ?policy, "decision policy selected");

    let processor = ReviewProcessor::new(policy, client, std::sync::Arc::new(recorder));
    let state = AppState::new(processor, store.clone());
    let router = router::build(
        state,
        &RouterOptions {
            webhook_path: cfg.webhook_path.clone(),
            request_timeout: cfg.request_timeout(),
        },
    );

    let server = Server::bind(cfg.listen_addr, &store, router).await?;
    let shutdown = server.shutdown_handle();
    let serving = tokio::spawn(server.serve());

    // -----------------------------------------------------------------------
    // 8. Shutdown
    // -----------------------------------------------------------------------
    shutdown_signal().await;
    info!("shutdown signal received");

    background.cancel();
    let drained = shutdown.shutdown(cfg.shutdown_timeout()).await;
    if !drained {
        warn!("exiting with connections still open");
    }
    events_cancel.cancel();

    for (name, task) in [
        ("server", serving),
        ("certificate watcher", hot_reload.watcher),
        ("certificate reload", hot_reload.reloader),
        ("event recorder", recorder_task),
    ] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }

    info!("admission-webhook stopped");
    drop(telemetry);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
