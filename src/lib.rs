//! StatefulSet Resize Webhook
//!
//! A mutating admission webhook that notices when a StatefulSet update grows
//! one of its volume claim templates. Claim templates are immutable, so the
//! webhook orphan-deletes the StatefulSet: pods and claims stay in place and
//! the next apply recreates the StatefulSet with the new templates.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    Webhook Server (axum)                          │
//! │  POST /mutate--v1-statefulset        /healthz /readyz /metrics    │
//! └───────────────┬───────────────────────────────────────────────────┘
//!                 │ AdmissionRequest<StatefulSet>
//! ┌───────────────┴───────────────────────────────────────────────────┐
//! │                    Resize Decision Engine                         │
//! │  snapshot lookup ─► parse ─► compare templates ─► orphan delete   │
//! └───────┬──────────────────────────────────────────────┬────────────┘
//!         │ SnapshotSource                               │ StatefulSetDeleter
//! ┌───────┴──────────────┐                  ┌────────────┴────────────┐
//! │ last-applied         │                  │ KubeDeleter / DryRun    │
//! │ annotation           │                  │                         │
//! └──────────────────────┘                  └─────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: Resize decision engine, quantities and snapshot parsing
//! - [`domain`]: Ports the engine depends on
//! - [`adapters`]: Deleter implementations
//! - [`webhook`]: Admission handler and server
//! - [`registration`]: MutatingWebhookConfiguration builder
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod registration;
pub mod webhook;

// Re-export commonly used types
pub use adapters::{DryRunDeleter, KubeDeleter, KubeDeleterConfig};

pub use domain::ports::{
    AnnotationSnapshot, DeletePropagation, DeleteTarget, SnapshotSource, StatefulSetDeleter,
    DEFAULT_SNAPSHOT_ANNOTATION,
};

pub use engine::{
    decode_statefulset, parse_snapshot, Decision, Evaluation, ResizeEngine, StorageQuantity,
    TemplateFinding,
};

pub use error::{Error, Result};

pub use metrics::WebhookMetrics;

pub use registration::{FailurePolicy, RegistrationConfig};

pub use webhook::{TlsConfig, WebhookServer, WebhookServerConfig, WebhookState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
