//! Webhook Metrics
//!
//! Prometheus counters for admissions, deletes and errors. Each
//! [`WebhookMetrics`] owns its own registry so instances stay independent.

use crate::engine::Decision;
use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters exported on `/metrics`
#[derive(Clone)]
pub struct WebhookMetrics {
    registry: Registry,
    admissions: IntCounterVec,
    deletes: IntCounter,
    errors: IntCounterVec,
}

impl WebhookMetrics {
    /// Create and register the counters
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let admissions = IntCounterVec::new(
            Opts::new(
                "statefulset_resize_admissions_total",
                "StatefulSet admissions evaluated, by decision",
            ),
            &["decision"],
        )?;
        let deletes = IntCounter::new(
            "statefulset_resize_orphan_deletes_total",
            "StatefulSets orphan-deleted after a volume claim template grew",
        )?;
        let errors = IntCounterVec::new(
            Opts::new(
                "statefulset_resize_errors_total",
                "StatefulSet admissions that failed, by error kind",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(deletes.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            admissions,
            deletes,
            errors,
        })
    }

    /// Record a successful evaluation
    pub fn record_decision(&self, decision: &Decision, dry_run: bool) {
        self.admissions.with_label_values(&[decision.label()]).inc();
        if matches!(decision, Decision::OrphanDeleted { .. }) && !dry_run {
            self.deletes.inc();
        }
    }

    /// Record a failed evaluation
    pub fn record_error(&self, error: &Error) {
        self.errors.with_label_values(&[error.kind_label()]).inc();
    }

    /// Encode all metrics in the Prometheus text format
    ///
    /// Returns the content type and the body.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
