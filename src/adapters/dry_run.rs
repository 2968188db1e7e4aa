//! Dry-run Deletion Adapter
//!
//! Used for admission requests that are themselves dry runs: the decision is
//! made as usual but nothing is deleted.

use crate::domain::ports::{DeletePropagation, DeleteTarget, StatefulSetDeleter};
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Deleter that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunDeleter;

#[async_trait]
impl StatefulSetDeleter for DryRunDeleter {
    async fn delete(&self, target: &DeleteTarget, propagation: DeletePropagation) -> Result<()> {
        info!(
            statefulset = %target,
            propagation = %propagation,
            "Dry-run admission, skipping StatefulSet delete"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
