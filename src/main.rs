//! StatefulSet Resize Webhook
//!
//! Serves the mutating admission webhook, or prints its registration
//! manifest with the `manifest` subcommand.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use statefulset_resize_webhook::{
    registration, Error, FailurePolicy, KubeDeleter, KubeDeleterConfig, RegistrationConfig,
    ResizeEngine, Result, TlsConfig, WebhookMetrics, WebhookServer, WebhookServerConfig,
    WebhookState, DEFAULT_SNAPSHOT_ANNOTATION,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// StatefulSet Resize Webhook - orphan-deletes StatefulSets whose volume claim templates grow
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Admission endpoint bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    webhook_addr: String,

    /// Health and metrics bind address
    #[arg(long, env = "PROBE_ADDR", default_value = "0.0.0.0:8081")]
    probe_addr: String,

    /// PEM certificate for the admission endpoint
    #[arg(long, env = "TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for the admission endpoint
    #[arg(long, env = "TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Annotation holding the last applied configuration
    #[arg(long, env = "SNAPSHOT_ANNOTATION", default_value = DEFAULT_SNAPSHOT_ANNOTATION)]
    snapshot_annotation: String,

    /// Send deletes as server-side dry runs
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Only delete the StatefulSet instance that was admitted (UID precondition)
    #[arg(long, env = "REQUIRE_UID_MATCH")]
    require_uid_match: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the MutatingWebhookConfiguration as YAML
    Manifest(ManifestArgs),
}

#[derive(ClapArgs, Debug)]
struct ManifestArgs {
    /// Namespace of the webhook Service
    #[arg(long, env = "WEBHOOK_NAMESPACE", default_value = "statefulset-resize-webhook")]
    namespace: String,

    /// Name of the webhook Service
    #[arg(long, env = "WEBHOOK_SERVICE", default_value = "statefulset-resize-webhook")]
    service_name: String,

    /// Port of the webhook Service
    #[arg(long, env = "WEBHOOK_SERVICE_PORT", default_value = "443")]
    service_port: i32,

    /// Path to the PEM CA bundle that signed the webhook certificate
    #[arg(long, env = "CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,

    /// Failure policy applied when the webhook call fails
    #[arg(long, value_enum, default_value_t = FailurePolicy::Ignore)]
    failure_policy: FailurePolicy,

    /// Webhook name
    #[arg(long, default_value = "statefulset.hsiaoairplane.io")]
    webhook_name: String,

    /// MutatingWebhookConfiguration name
    #[arg(long, default_value = "statefulset-resize-webhook")]
    configuration_name: String,

    /// Webhook call timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_seconds: i32,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    match &args.command {
        Some(Command::Manifest(manifest)) => print_manifest(manifest),
        None => serve(&args).await,
    }
}

async fn serve(args: &Args) -> Result<()> {
    info!("Starting StatefulSet Resize Webhook");
    info!("  Version: {}", statefulset_resize_webhook::VERSION);
    info!("  Snapshot annotation: {}", args.snapshot_annotation);
    info!("  Dry-run deletes: {}", args.dry_run);

    let client = kube::Client::try_default().await?;
    info!("Kubernetes client initialized");

    let deleter = KubeDeleter::new(
        client,
        KubeDeleterConfig {
            dry_run: args.dry_run,
            require_uid_match: args.require_uid_match,
        },
    );

    let metrics = Arc::new(WebhookMetrics::new()?);
    let state = WebhookState::new(
        ResizeEngine::new(args.snapshot_annotation.clone()),
        Arc::new(deleter),
        metrics,
    );

    let tls = match (&args.tls_cert, &args.tls_key) {
        (Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path: cert_path.clone(),
            key_path: key_path.clone(),
        }),
        _ => None,
    };

    let config = WebhookServerConfig {
        webhook_addr: parse_addr("webhook", &args.webhook_addr)?,
        probe_addr: parse_addr("probe", &args.probe_addr)?,
        tls,
        ..Default::default()
    };

    WebhookServer::new(config, state).run().await?;

    info!("Webhook shutdown complete");
    Ok(())
}

fn print_manifest(args: &ManifestArgs) -> Result<()> {
    let ca_bundle = args.ca_bundle.as_ref().map(std::fs::read).transpose()?;

    let config = RegistrationConfig {
        configuration_name: args.configuration_name.clone(),
        webhook_name: args.webhook_name.clone(),
        service_namespace: args.namespace.clone(),
        service_name: args.service_name.clone(),
        service_port: args.service_port,
        ca_bundle,
        failure_policy: args.failure_policy,
        timeout_seconds: args.timeout_seconds,
    };

    print!("{}", registration::render_manifest(&config)?);
    Ok(())
}

fn parse_addr(name: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {}: {}", name, addr, e)))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so `manifest` output stays clean
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
