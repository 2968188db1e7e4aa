//! Webhook Registration
//!
//! Builds the `MutatingWebhookConfiguration` that registers the webhook for
//! StatefulSet updates. Deployment tooling applies it; the webhook itself
//! never writes it to the cluster.

use crate::error::Result;
use crate::webhook::MUTATE_PATH;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

/// What the API server does when the webhook call itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Admit the update anyway
    #[default]
    Ignore,
    /// Reject the update
    Fail,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Ignore => "Ignore",
            FailurePolicy::Fail => "Fail",
        }
    }
}

/// Inputs for the registration manifest
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Name of the MutatingWebhookConfiguration object
    pub configuration_name: String,
    /// Fully qualified webhook name
    pub webhook_name: String,
    /// Namespace of the Service fronting the webhook
    pub service_namespace: String,
    /// Name of the Service fronting the webhook
    pub service_name: String,
    /// Service port
    pub service_port: i32,
    /// PEM bundle the API server uses to verify the webhook's certificate
    pub ca_bundle: Option<Vec<u8>>,
    pub failure_policy: FailurePolicy,
    /// Webhook call timeout
    pub timeout_seconds: i32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            configuration_name: "statefulset-resize-webhook".to_string(),
            webhook_name: "statefulset.hsiaoairplane.io".to_string(),
            service_namespace: "statefulset-resize-webhook".to_string(),
            service_name: "statefulset-resize-webhook".to_string(),
            service_port: 443,
            ca_bundle: None,
            failure_policy: FailurePolicy::Ignore,
            timeout_seconds: 10,
        }
    }
}

/// Build the registration object
///
/// Registers for `UPDATE` of `apps/v1` `statefulsets` with an exact match
/// policy. Dry-run admissions never delete, hence `NoneOnDryRun`.
pub fn mutating_webhook_configuration(
    config: &RegistrationConfig,
) -> MutatingWebhookConfiguration {
    let strings = |values: &[&str]| -> Option<Vec<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    };

    let webhook = MutatingWebhook {
        name: config.webhook_name.clone(),
        admission_review_versions: vec!["v1".to_string()],
        client_config: WebhookClientConfig {
            ca_bundle: config.ca_bundle.clone().map(ByteString),
            service: Some(ServiceReference {
                namespace: config.service_namespace.clone(),
                name: config.service_name.clone(),
                path: Some(MUTATE_PATH.to_string()),
                port: Some(config.service_port),
            }),
            url: None,
        },
        rules: Some(vec![RuleWithOperations {
            api_groups: strings(&["apps"]),
            api_versions: strings(&["v1"]),
            operations: strings(&["UPDATE"]),
            resources: strings(&["statefulsets"]),
            scope: Some("Namespaced".to_string()),
        }]),
        match_policy: Some("Exact".to_string()),
        failure_policy: Some(config.failure_policy.as_str().to_string()),
        side_effects: "NoneOnDryRun".to_string(),
        timeout_seconds: Some(config.timeout_seconds),
        ..Default::default()
    };

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(config.configuration_name.clone()),
            ..Default::default()
        },
        webhooks: Some(vec![webhook]),
    }
}

/// Render the registration object as YAML
pub fn render_manifest(config: &RegistrationConfig) -> Result<String> {
    Ok(serde_yaml::to_string(&mutating_webhook_configuration(config))?)
}
