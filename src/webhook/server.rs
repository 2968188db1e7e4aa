//! Webhook Server
//!
//! Runs the admission endpoint (plain HTTP or TLS) and the probe endpoint.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::{probe_router, webhook_router, WebhookState};

// =============================================================================
// Server Configuration
// =============================================================================

/// TLS certificate and key, PEM encoded
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Configuration for the webhook server
#[derive(Debug, Clone)]
pub struct WebhookServerConfig {
    /// Admission endpoint bind address
    pub webhook_addr: SocketAddr,
    /// Health and metrics bind address
    pub probe_addr: SocketAddr,
    /// Serve the admission endpoint over TLS
    pub tls: Option<TlsConfig>,
    /// Time allowed for in-flight requests on shutdown
    pub shutdown_grace: Duration,
}

impl Default for WebhookServerConfig {
    fn default() -> Self {
        Self {
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], 9443)),
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            tls: None,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Webhook Server
// =============================================================================

/// Admission webhook server
pub struct WebhookServer {
    config: WebhookServerConfig,
    state: Arc<WebhookState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebhookServer {
    /// Create a new webhook server
    pub fn new(config: WebhookServerConfig, state: Arc<WebhookState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Run until shutdown is triggered or the admission server fails
    pub async fn run(&self) -> Result<()> {
        info!("Starting StatefulSet resize webhook");
        info!("  Webhook: {}", self.config.webhook_addr);
        info!("  Probes: {}", self.config.probe_addr);
        info!("  TLS: {}", self.config.tls.is_some());

        let signal_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            let _ = signal_tx.send(());
        });

        let probe_handle = self.spawn_probe_server();
        let webhook_handle = self.spawn_webhook_server();

        let result = match webhook_handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("Webhook server task failed: {}", e))),
        };

        self.shutdown();
        if let Err(e) = probe_handle.await {
            error!("Probe server task failed: {:?}", e);
        }

        result
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_webhook_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.webhook_addr;
        let tls = self.config.tls.clone();
        let grace = self.config.shutdown_grace;
        let state = self.state.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            match tls {
                Some(tls) => run_tls_webhook_server(addr, tls, grace, state, shutdown_rx).await,
                None => run_webhook_server(addr, state, shutdown_rx).await,
            }
        })
    }

    fn spawn_probe_server(&self) -> tokio::task::JoinHandle<()> {
        let addr = self.config.probe_addr;
        let metrics = self.state.metrics.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(addr = %addr, error = %e, "Failed to bind probe server");
                    return;
                }
            };
            info!("Probe server listening on {}", addr);

            if let Err(e) = axum::serve(listener, probe_router(metrics))
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                error!("Probe server error: {}", e);
            }
        })
    }
}

/// Run the admission endpoint over plain HTTP
async fn run_webhook_server(
    addr: SocketAddr,
    state: Arc<WebhookState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind webhook server: {}", e)))?;

    info!("Webhook listening on {} (plain HTTP)", addr);

    axum::serve(listener, webhook_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Webhook server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("Webhook server error: {}", e)))?;

    Ok(())
}

/// Run the admission endpoint over TLS
async fn run_tls_webhook_server(
    addr: SocketAddr,
    tls: TlsConfig,
    grace: Duration,
    state: Arc<WebhookState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| {
            Error::Configuration(format!(
                "TLS config error ({}, {}): {}",
                tls.cert_path.display(),
                tls.key_path.display(),
                e
            ))
        })?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        info!("Webhook server shutting down");
        shutdown_handle.graceful_shutdown(Some(grace));
    });

    info!("Webhook listening on {} (TLS)", addr);

    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| Error::Internal(format!("Webhook server error: {}", e)))?;

    Ok(())
}

/// Resolve when the process receives Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
