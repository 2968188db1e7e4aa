//! Error types for the StatefulSet resize webhook
//!
//! Provides structured error types for the resize decision engine, the
//! deletion adapters and the webhook server.

use thiserror::Error;

/// Unified error type for the webhook
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Resize Engine Errors
    // =========================================================================
    #[error("expected a StatefulSet but got {found}")]
    TypeMismatch { found: String },

    #[error("failed to parse previous-state snapshot: {reason}")]
    MalformedSnapshot { reason: String },

    #[error("failed to orphan delete StatefulSet {namespace}/{name}: {source}")]
    DeletePropagationFailed {
        namespace: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("invalid quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: String },

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status code reported in a denied admission response
    pub fn status_code(&self) -> u16 {
        match self {
            Error::TypeMismatch { .. }
            | Error::MalformedSnapshot { .. }
            | Error::InvalidQuantity { .. } => 400,
            _ => 500,
        }
    }

    /// Check if this error is transient
    ///
    /// Only API server failures qualify; a retried admission may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(_) => true,
            Error::DeletePropagationFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Short, stable label used for the error metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::MalformedSnapshot { .. } => "malformed_snapshot",
            Error::DeletePropagationFailed { .. } => "delete_propagation_failed",
            Error::InvalidQuantity { .. } => "invalid_quantity",
            Error::Serialization(_) | Error::Yaml(_) => "serialization",
            Error::Kube(_) => "kube",
            Error::Internal(_) | Error::Metrics(_) | Error::Io(_) => "internal",
            Error::Configuration(_) => "configuration",
        }
    }
}

/// Result type alias for the webhook
pub type Result<T> = std::result::Result<T, Error>;
