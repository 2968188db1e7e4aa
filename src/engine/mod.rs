//! Resize Decision Engine
//!
//! Decides, for one admission of a StatefulSet update, whether a volume claim
//! template's storage request grew compared to the last applied
//! configuration. Volume claim templates are immutable, so growth is handled
//! by orphan-deleting the StatefulSet: the pods and claims survive and the
//! next apply recreates the parent with the new templates.
//!
//! ```text
//! Start ─┬─ no snapshot ─────────────────────────────► SnapshotMissing
//!        ├─ unparseable snapshot ────────────────────► MalformedSnapshot (error)
//!        └─ scan templates ─┬─ identical lists ──────► TemplatesIdentical
//!                           ├─ shrink (warn, go on)
//!                           ├─ no growth ────────────► NoGrowth
//!                           └─ first growth ─ delete ┬► OrphanDeleted
//!                                                    └► DeletePropagationFailed (error)
//! ```

pub mod quantity;
pub mod snapshot;

pub use quantity::StorageQuantity;
pub use snapshot::parse_snapshot;

use crate::domain::ports::{
    AnnotationSnapshot, DeletePropagation, DeleteTarget, SnapshotSource, StatefulSetDeleter,
};
use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::DynamicObject;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Resource key of the storage request on a claim template
const STORAGE_RESOURCE: &str = "storage";

const STATEFULSET_API_VERSION: &str = "apps/v1";
const STATEFULSET_KIND: &str = "StatefulSet";

// =============================================================================
// Evaluation Results
// =============================================================================

/// What the engine observed for one claim template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFinding {
    /// Not present in the previous snapshot
    New { template: String },
    /// Present in the snapshot but without a storage request
    NoPreviousSize { template: String },
    /// Same magnitude as before
    Unchanged { template: String },
    /// Smaller than before; reported, never acted on
    Shrunk {
        template: String,
        previous: StorageQuantity,
        current: StorageQuantity,
    },
    /// Larger than before
    Grew {
        template: String,
        previous: StorageQuantity,
        current: StorageQuantity,
    },
}

/// Terminal state of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No previous-state annotation; nothing to compare against
    SnapshotMissing,
    /// Claim template lists are structurally identical
    TemplatesIdentical,
    /// Templates differ but no storage request grew
    NoGrowth,
    /// A template grew and the StatefulSet was orphan-deleted
    OrphanDeleted { template: String },
}

impl Decision {
    /// Short, stable label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Decision::SnapshotMissing => "snapshot_missing",
            Decision::TemplatesIdentical => "templates_identical",
            Decision::NoGrowth => "no_growth",
            Decision::OrphanDeleted { .. } => "orphan_deleted",
        }
    }
}

/// Outcome of [`ResizeEngine::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Per-template findings, in the order the templates were scanned
    pub findings: Vec<TemplateFinding>,
}

impl Evaluation {
    fn new(decision: Decision, findings: Vec<TemplateFinding>) -> Self {
        Self { decision, findings }
    }

    /// Whether a delete was issued
    pub fn deleted(&self) -> bool {
        matches!(self.decision, Decision::OrphanDeleted { .. })
    }

    /// Templates whose storage request shrank
    pub fn shrunk_templates(&self) -> impl Iterator<Item = &str> {
        self.findings.iter().filter_map(|finding| match finding {
            TemplateFinding::Shrunk { template, .. } => Some(template.as_str()),
            _ => None,
        })
    }
}

// =============================================================================
// Resize Engine
// =============================================================================

/// Stateless decision engine; one instance serves every admission
#[derive(Debug, Clone, Default)]
pub struct ResizeEngine<S = AnnotationSnapshot> {
    source: S,
}

impl ResizeEngine<AnnotationSnapshot> {
    /// Create an engine reading the snapshot from the given annotation key
    pub fn new(annotation_key: impl Into<String>) -> Self {
        Self::with_source(AnnotationSnapshot::new(annotation_key))
    }
}

impl<S: SnapshotSource> ResizeEngine<S> {
    /// Create an engine with a custom snapshot source
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    /// The snapshot source in use
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Evaluate one StatefulSet update
    ///
    /// Issues at most one orphan delete through `deleter`. `current` is only
    /// read.
    pub async fn evaluate(
        &self,
        current: &StatefulSet,
        deleter: &dyn StatefulSetDeleter,
    ) -> Result<Evaluation> {
        let target = DeleteTarget::from_statefulset(current);

        let Some(text) = self.source.previous(current) else {
            info!(statefulset = %target, "No last applied configuration");
            return Ok(Evaluation::new(Decision::SnapshotMissing, Vec::new()));
        };

        let previous = parse_snapshot(text)?;
        let previous_templates = claim_templates(&previous);
        let current_templates = claim_templates(current);

        if volume_claim_templates(&previous) == volume_claim_templates(current) {
            info!(statefulset = %target, "Volume claim templates are the same");
            return Ok(Evaluation::new(Decision::TemplatesIdentical, Vec::new()));
        }

        let mut findings = Vec::with_capacity(current_templates.len());

        for template in current_templates {
            let name = template.metadata.name.clone().unwrap_or_default();

            let Some(previous_template) = find_template(previous_templates, &name) else {
                info!(
                    statefulset = %target,
                    template = %name,
                    "Volume claim template not found in last applied configuration"
                );
                findings.push(TemplateFinding::New { template: name });
                continue;
            };

            let Some(previous_size) = storage_request(previous_template) else {
                info!(
                    statefulset = %target,
                    template = %name,
                    "Volume claim template has no storage request in last applied configuration"
                );
                findings.push(TemplateFinding::NoPreviousSize { template: name });
                continue;
            };
            let previous_size =
                StorageQuantity::from_quantity(previous_size).map_err(|e| {
                    Error::MalformedSnapshot {
                        reason: e.to_string(),
                    }
                })?;
            let current_size = match storage_request(template) {
                Some(size) => StorageQuantity::from_quantity(size)?,
                None => StorageQuantity::zero(),
            };

            match current_size.cmp(&previous_size) {
                Ordering::Equal => {
                    debug!(
                        statefulset = %target,
                        template = %name,
                        size = %current_size,
                        "Volume claim template size matches last applied configuration"
                    );
                    findings.push(TemplateFinding::Unchanged { template: name });
                }
                Ordering::Less => {
                    warn!(
                        statefulset = %target,
                        template = %name,
                        previous = %previous_size,
                        current = %current_size,
                        "Volume claim template size is smaller than last applied configuration"
                    );
                    findings.push(TemplateFinding::Shrunk {
                        template: name,
                        previous: previous_size,
                        current: current_size,
                    });
                }
                Ordering::Greater => {
                    info!(
                        statefulset = %target,
                        template = %name,
                        previous = %previous_size,
                        current = %current_size,
                        deleter = deleter.name(),
                        "Volume claim template grew, orphan deleting StatefulSet"
                    );

                    deleter
                        .delete(&target, DeletePropagation::Orphan)
                        .await
                        .map_err(|e| Error::DeletePropagationFailed {
                            namespace: target.namespace.clone(),
                            name: target.name.clone(),
                            source: Box::new(e),
                        })?;

                    findings.push(TemplateFinding::Grew {
                        template: name.clone(),
                        previous: previous_size,
                        current: current_size,
                    });
                    // One delete removes the whole StatefulSet
                    return Ok(Evaluation::new(
                        Decision::OrphanDeleted { template: name },
                        findings,
                    ));
                }
            }
        }

        Ok(Evaluation::new(Decision::NoGrowth, findings))
    }
}

// =============================================================================
// StatefulSet Helpers
// =============================================================================

/// Decode an admission object into a StatefulSet
///
/// `fallback_namespace` fills in the namespace when the object omits it.
pub fn decode_statefulset(
    object: &DynamicObject,
    fallback_namespace: Option<&str>,
) -> Result<StatefulSet> {
    let found = match &object.types {
        Some(types) => format!("{}/{}", types.api_version, types.kind),
        None => "an object without apiVersion/kind".to_string(),
    };
    let is_statefulset = object
        .types
        .as_ref()
        .is_some_and(|t| t.api_version == STATEFULSET_API_VERSION && t.kind == STATEFULSET_KIND);
    if !is_statefulset {
        return Err(Error::TypeMismatch { found });
    }

    let value = serde_json::to_value(object)?;
    let mut sts: StatefulSet = serde_json::from_value(value).map_err(|e| Error::TypeMismatch {
        found: format!("{} that does not decode: {}", found, e),
    })?;

    if sts.metadata.namespace.is_none() {
        sts.metadata.namespace = fallback_namespace.map(str::to_string);
    }
    Ok(sts)
}

fn volume_claim_templates(sts: &StatefulSet) -> Option<&Vec<PersistentVolumeClaim>> {
    sts.spec
        .as_ref()
        .and_then(|spec| spec.volume_claim_templates.as_ref())
}

/// Claim templates of a StatefulSet, empty when unset
pub(crate) fn claim_templates(sts: &StatefulSet) -> &[PersistentVolumeClaim] {
    volume_claim_templates(sts).map(Vec::as_slice).unwrap_or(&[])
}

/// Storage request of a claim template
pub(crate) fn storage_request(template: &PersistentVolumeClaim) -> Option<&Quantity> {
    template
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get(STORAGE_RESOURCE)
}

fn find_template<'a>(
    templates: &'a [PersistentVolumeClaim],
    name: &str,
) -> Option<&'a PersistentVolumeClaim> {
    templates
        .iter()
        .find(|template| template.metadata.name.as_deref() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingDeleter;
    use crate::domain::ports::DEFAULT_SNAPSHOT_ANNOTATION;
    use assert_matches::assert_matches;
    use serde_json::json;

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn template(name: &str, size: Option<&str>) -> serde_json::Value {
        let spec = match size {
            Some(size) => json!({
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": size } }
            }),
            None => json!({ "accessModes": ["ReadWriteOnce"] }),
        };
        json!({ "metadata": { "name": name }, "spec": spec })
    }

    fn statefulset(templates: &[(&str, Option<&str>)]) -> StatefulSet {
        let templates: Vec<_> = templates
            .iter()
            .map(|(name, size)| template(name, *size))
            .collect();
        serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": { "name": "web", "namespace": "default", "uid": "uid-1" },
            "spec": {
                "serviceName": "web",
                "selector": { "matchLabels": { "app": "web" } },
                "template": { "metadata": { "labels": { "app": "web" } } },
                "volumeClaimTemplates": templates
            }
        }))
        .unwrap()
    }

    fn sized(templates: &[(&str, &str)]) -> StatefulSet {
        let templates: Vec<_> = templates.iter().map(|(n, s)| (*n, Some(*s))).collect();
        statefulset(&templates)
    }

    fn with_snapshot(mut current: StatefulSet, previous: &StatefulSet) -> StatefulSet {
        let text = serde_json::to_string(previous).unwrap();
        with_annotation(&mut current, text);
        current
    }

    fn with_annotation(current: &mut StatefulSet, text: String) {
        current
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(DEFAULT_SNAPSHOT_ANNOTATION.to_string(), text);
    }

    fn engine() -> ResizeEngine {
        ResizeEngine::new(DEFAULT_SNAPSHOT_ANNOTATION)
    }

    // =========================================================================
    // Scenarios
    // =========================================================================

    #[tokio::test]
    async fn test_growth_triggers_single_orphan_delete() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(
            evaluation.decision,
            Decision::OrphanDeleted {
                template: "data".into()
            }
        );
        let calls = deleter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.name, "web");
        assert_eq!(calls[0].0.namespace, "default");
        assert_eq!(calls[0].0.uid.as_deref(), Some("uid-1"));
        assert_eq!(calls[0].1, DeletePropagation::Orphan);
    }

    #[tokio::test]
    async fn test_identical_templates_are_a_no_op() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "10Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        for _ in 0..3 {
            let evaluation = engine().evaluate(&current, &deleter).await.unwrap();
            assert_eq!(evaluation.decision, Decision::TemplatesIdentical);
        }
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_shrink_is_reported_not_acted_on() {
        let previous = sized(&[("data", "20Gi")]);
        let current = with_snapshot(sized(&[("data", "10Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(evaluation.decision, Decision::NoGrowth);
        assert_eq!(evaluation.shrunk_templates().collect::<Vec<_>>(), vec!["data"]);
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_snapshot_short_circuits() {
        let current = sized(&[("data", "20Gi")]);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(evaluation.decision, Decision::SnapshotMissing);
        assert!(evaluation.findings.is_empty());
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_fails_closed() {
        let mut current = sized(&[("data", "20Gi")]);
        with_annotation(&mut current, "{this is: [not valid".to_string());
        let deleter = RecordingDeleter::new();

        let result = engine().evaluate(&current, &deleter).await;

        assert_matches!(result, Err(Error::MalformedSnapshot { .. }));
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_growths_delete_once() {
        let previous = sized(&[("data", "10Gi"), ("logs", "5Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi"), ("logs", "10Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(deleter.call_count(), 1);
        assert_eq!(
            evaluation.decision,
            Decision::OrphanDeleted {
                template: "data".into()
            }
        );
        // Scanning stops at the first growth
        assert_eq!(evaluation.findings.len(), 1);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    #[tokio::test]
    async fn test_delete_iff_strictly_greater() {
        let cases = [
            ("10Gi", "10Gi", false),
            ("10Gi", "11Gi", true),
            ("10Gi", "9Gi", false),
            ("1Gi", "1025Mi", true),
            ("1Gi", "1023Mi", false),
            ("1G", "1Gi", true),
            ("1Gi", "1G", false),
        ];

        for (previous_size, current_size, expect_delete) in cases {
            // Extra template keeps the fast path from short-circuiting equal sizes
            let previous = sized(&[("data", previous_size)]);
            let current = with_snapshot(
                sized(&[("data", current_size), ("scratch", "1Gi")]),
                &previous,
            );
            let deleter = RecordingDeleter::new();

            let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

            assert_eq!(
                evaluation.deleted(),
                expect_delete,
                "{} -> {}",
                previous_size,
                current_size
            );
            assert_eq!(deleter.call_count(), usize::from(expect_delete));
        }
    }

    #[tokio::test]
    async fn test_unit_agnostic_comparison() {
        let pairs = [("1Gi", "1024Mi"), ("1Gi", "1073741824"), ("1000M", "1G")];
        for (previous_size, current_size) in pairs {
            let previous = sized(&[("data", previous_size)]);
            let current = with_snapshot(sized(&[("data", current_size)]), &previous);
            let deleter = RecordingDeleter::new();

            let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

            assert_eq!(evaluation.decision, Decision::NoGrowth);
            assert_eq!(
                evaluation.findings,
                vec![TemplateFinding::Unchanged {
                    template: "data".into()
                }]
            );
            assert_eq!(deleter.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_new_template_is_not_a_resize() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "10Gi"), ("cache", "50Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(evaluation.decision, Decision::NoGrowth);
        assert!(evaluation.findings.contains(&TemplateFinding::New {
            template: "cache".into()
        }));
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_growth_after_shrink_still_deletes() {
        let previous = sized(&[("data", "20Gi"), ("logs", "5Gi")]);
        let current = with_snapshot(sized(&[("data", "10Gi"), ("logs", "10Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();

        assert_eq!(
            evaluation.decision,
            Decision::OrphanDeleted {
                template: "logs".into()
            }
        );
        assert_eq!(evaluation.shrunk_templates().collect::<Vec<_>>(), vec!["data"]);
        assert_eq!(deleter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_sizes() {
        // Previous template without a size is skipped
        let previous = statefulset(&[("data", None)]);
        let current = with_snapshot(sized(&[("data", "10Gi")]), &previous);
        let deleter = RecordingDeleter::new();
        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();
        assert_eq!(
            evaluation.findings,
            vec![TemplateFinding::NoPreviousSize {
                template: "data".into()
            }]
        );
        assert_eq!(deleter.call_count(), 0);

        // Current template without a size compares as zero
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(statefulset(&[("data", None)]), &previous);
        let evaluation = engine().evaluate(&current, &deleter).await.unwrap();
        assert_eq!(evaluation.shrunk_templates().count(), 1);
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_propagates() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let deleter = RecordingDeleter::failing("etcdserver: request timed out");

        let err = engine().evaluate(&current, &deleter).await.unwrap_err();

        assert_matches!(
            &err,
            Error::DeletePropagationFailed { namespace, name, .. }
                if namespace == "default" && name == "web"
        );
        assert!(err.to_string().contains("etcdserver: request timed out"));
        assert_eq!(deleter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_api_server_failure_is_transient() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let deleter = RecordingDeleter::failing_api(504, "Timeout");

        let err = engine().evaluate(&current, &deleter).await.unwrap_err();

        assert_matches!(
            &err,
            Error::DeletePropagationFailed { source, .. } if matches!(**source, Error::Kube(_))
        );
        assert!(err.is_transient());
        assert_eq!(err.status_code(), 500);
        assert_eq!(deleter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_delete_is_bounded_by_caller() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let deleter = RecordingDeleter::hanging();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            engine().evaluate(&current, &deleter),
        )
        .await;

        // The engine waits on the deleter without a deadline or retry of its own
        assert!(result.is_err());
        assert_eq!(deleter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_annotation_key() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let deleter = RecordingDeleter::new();

        let engine = ResizeEngine::new("kubectl.kubernetes.io/last-applied-configuration");
        let evaluation = engine.evaluate(&current, &deleter).await.unwrap();

        assert_eq!(evaluation.decision, Decision::SnapshotMissing);
        assert_eq!(deleter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_current_is_not_mutated() {
        let previous = sized(&[("data", "10Gi")]);
        let current = with_snapshot(sized(&[("data", "20Gi")]), &previous);
        let before = current.clone();

        engine()
            .evaluate(&current, &RecordingDeleter::new())
            .await
            .unwrap();

        assert_eq!(current, before);
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    fn dynamic(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_statefulset() {
        let object = dynamic(serde_json::to_value(sized(&[("data", "10Gi")])).unwrap());
        let sts = decode_statefulset(&object, Some("other")).unwrap();
        assert_eq!(sts.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(claim_templates(&sts).len(), 1);
    }

    #[test]
    fn test_decode_uses_fallback_namespace() {
        let mut value = serde_json::to_value(sized(&[("data", "10Gi")])).unwrap();
        value["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("namespace");
        let sts = decode_statefulset(&dynamic(value), Some("team-a")).unwrap();
        assert_eq!(sts.metadata.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_decode_rejects_other_kinds() {
        let object = dynamic(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web" },
            "spec": {}
        }));
        assert_matches!(
            decode_statefulset(&object, None),
            Err(Error::TypeMismatch { found }) if found == "apps/v1/Deployment"
        );
    }
}
