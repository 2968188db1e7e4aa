//! Previous-state snapshot parsing
//!
//! The last applied configuration is a whole StatefulSet serialized into an
//! annotation. kubectl writes JSON; hand-maintained tooling sometimes writes
//! YAML. Both are read through the YAML parser, which accepts JSON documents.

use crate::engine::quantity::StorageQuantity;
use crate::engine::{claim_templates, storage_request};
use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::StatefulSet;

/// Parse a serialized StatefulSet snapshot
///
/// Fails with [`Error::MalformedSnapshot`] when the text is not valid YAML or
/// JSON, does not describe a StatefulSet, or holds a claim template whose
/// storage request is not a valid quantity.
pub fn parse_snapshot(text: &str) -> Result<StatefulSet> {
    let snapshot: StatefulSet =
        serde_yaml::from_str(text).map_err(|e| Error::MalformedSnapshot {
            reason: e.to_string(),
        })?;

    for template in claim_templates(&snapshot) {
        if let Some(size) = storage_request(template) {
            StorageQuantity::from_quantity(size).map_err(|e| Error::MalformedSnapshot {
                reason: format!(
                    "volume claim template {}: {}",
                    template.metadata.name.as_deref().unwrap_or_default(),
                    e
                ),
            })?;
        }
    }

    Ok(snapshot)
}
