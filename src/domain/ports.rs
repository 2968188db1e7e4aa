//! Domain Ports - Core trait definitions for the resize webhook
//!
//! These traits define the boundaries between the decision engine and the
//! platform. Adapters implement them to provide concrete functionality.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::PropagationPolicy;
use std::sync::Arc;

/// Annotation carrying the last applied configuration in the reference deployment
pub const DEFAULT_SNAPSHOT_ANNOTATION: &str = "last-applied-configuration";

// =============================================================================
// Delete Target
// =============================================================================

/// Identity of the StatefulSet a delete is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
    /// UID precondition, when the object carries one
    pub uid: Option<String>,
}

impl DeleteTarget {
    /// Build the target from a StatefulSet's metadata
    pub fn from_statefulset(sts: &StatefulSet) -> Self {
        Self {
            name: sts.metadata.name.clone().unwrap_or_default(),
            namespace: sts.metadata.namespace.clone().unwrap_or_default(),
            uid: sts.metadata.uid.clone(),
        }
    }
}

impl std::fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Propagation mode for a delete
///
/// Only orphaning is expressible: pods and claims must outlive the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletePropagation {
    /// Remove only the parent; dependents survive
    Orphan,
}

impl From<DeletePropagation> for PropagationPolicy {
    fn from(value: DeletePropagation) -> Self {
        match value {
            DeletePropagation::Orphan => PropagationPolicy::Orphan,
        }
    }
}

impl std::fmt::Display for DeletePropagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletePropagation::Orphan => write!(f, "Orphan"),
        }
    }
}

// =============================================================================
// StatefulSet Deleter Port
// =============================================================================

/// Port for deleting the StatefulSet under admission
///
/// Timeouts and cancellation belong to the implementation's transport.
#[async_trait]
pub trait StatefulSetDeleter: Send + Sync {
    /// Delete the target with the given propagation policy
    async fn delete(&self, target: &DeleteTarget, propagation: DeletePropagation) -> Result<()>;

    /// Adapter name, for logs
    fn name(&self) -> &str;

    /// Whether deletes are only simulated and nothing is removed
    fn is_dry_run(&self) -> bool {
        false
    }
}

// =============================================================================
// Snapshot Source Port
// =============================================================================

/// Port for locating the previously applied configuration of an object
pub trait SnapshotSource: Send + Sync {
    /// Return the serialized snapshot, or `None` when nothing was recorded
    fn previous<'a>(&self, current: &'a StatefulSet) -> Option<&'a str>;
}

/// Reads the snapshot from a single annotation key
#[derive(Debug, Clone)]
pub struct AnnotationSnapshot {
    key: String,
}

impl AnnotationSnapshot {
    /// Create a lookup for the given annotation key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The annotation key being read
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Default for AnnotationSnapshot {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_ANNOTATION)
    }
}

impl SnapshotSource for AnnotationSnapshot {
    fn previous<'a>(&self, current: &'a StatefulSet) -> Option<&'a str> {
        current
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(&self.key))
            .map(String::as_str)
    }
}

pub type StatefulSetDeleterRef = Arc<dyn StatefulSetDeleter>;
