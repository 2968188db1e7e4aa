//! API Server Deletion Adapter
//!
//! Deletes StatefulSets through the Kubernetes API server.

use crate::domain::ports::{DeletePropagation, DeleteTarget, StatefulSetDeleter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{Api, DeleteParams, Preconditions};
use kube::Client;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the API server deleter
#[derive(Debug, Clone, Default)]
pub struct KubeDeleterConfig {
    /// Send deletes as server-side dry runs
    pub dry_run: bool,
    /// Refuse to delete a StatefulSet that was recreated under the same name
    pub require_uid_match: bool,
}

// =============================================================================
// Kube Deleter
// =============================================================================

/// Adapter issuing deletes with a `kube::Client`
///
/// Request timeouts and cancellation come from the client's transport.
#[derive(Clone)]
pub struct KubeDeleter {
    client: Client,
    config: KubeDeleterConfig,
}

impl KubeDeleter {
    /// Create a new deleter
    pub fn new(client: Client, config: KubeDeleterConfig) -> Self {
        Self { client, config }
    }

    fn delete_params(&self, target: &DeleteTarget, propagation: DeletePropagation) -> DeleteParams {
        delete_params(&self.config, target, propagation)
    }
}

/// Build the delete options for a target
fn delete_params(
    config: &KubeDeleterConfig,
    target: &DeleteTarget,
    propagation: DeletePropagation,
) -> DeleteParams {
    let preconditions = match (&target.uid, config.require_uid_match) {
        (Some(uid), true) => Some(Preconditions {
            uid: Some(uid.clone()),
            resource_version: None,
        }),
        _ => None,
    };

    DeleteParams {
        dry_run: config.dry_run,
        propagation_policy: Some(propagation.into()),
        preconditions,
        ..Default::default()
    }
}

#[async_trait]
impl StatefulSetDeleter for KubeDeleter {
    async fn delete(&self, target: &DeleteTarget, propagation: DeletePropagation) -> Result<()> {
        if target.name.is_empty() || target.namespace.is_empty() {
            return Err(Error::Internal(format!(
                "cannot delete StatefulSet without name and namespace: {}",
                target
            )));
        }

        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = self.delete_params(target, propagation);

        debug!(
            statefulset = %target,
            propagation = %propagation,
            dry_run = params.dry_run,
            "Issuing StatefulSet delete"
        );

        api.delete(&target.name, &params).await?;

        info!(
            statefulset = %target,
            propagation = %propagation,
            dry_run = params.dry_run,
            "StatefulSet deleted"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "api-server"
    }

    fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }
}
