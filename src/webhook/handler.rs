//! StatefulSet Admission Handler
//!
//! Turns an AdmissionReview into an engine evaluation and the evaluation
//! back into an AdmissionResponse.

use std::sync::Arc;

use axum::{extract::State, Json};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use tracing::{debug, error, info};

use crate::adapters::DryRunDeleter;
use crate::domain::ports::StatefulSetDeleter;
use crate::engine::{decode_statefulset, Evaluation};
use crate::error::Result;

use super::WebhookState;

/// Handle a mutating admission review for StatefulSets
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = admit(&state, &request).await;
    Json(response.into_review())
}

/// Process a single admission request
///
/// Engine errors deny the request with the error's status code; the
/// registered failure policy decides what the API server makes of it.
pub async fn admit(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = &request.uid;

    if !matches!(request.operation, Operation::Update) {
        debug!(uid = %uid, operation = ?request.operation, "Not an update, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    let Some(object) = &request.object else {
        debug!(uid = %uid, "No object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    // Dry-run admissions must not delete anything
    let deleter: &dyn StatefulSetDeleter = if request.dry_run {
        &DryRunDeleter
    } else {
        state.deleter.as_ref()
    };

    match evaluate(state, request, object, deleter).await {
        Ok(evaluation) => {
            info!(
                uid = %uid,
                name = %request.name,
                namespace = ?request.namespace,
                decision = evaluation.decision.label(),
                deleter = deleter.name(),
                dry_run = deleter.is_dry_run(),
                "StatefulSet admission evaluated"
            );
            state
                .metrics
                .record_decision(&evaluation.decision, deleter.is_dry_run());
            AdmissionResponse::from(request)
        }
        Err(e) => {
            error!(
                uid = %uid,
                name = %request.name,
                namespace = ?request.namespace,
                error = %e,
                transient = e.is_transient(),
                "StatefulSet admission failed"
            );
            state.metrics.record_error(&e);
            let mut response = AdmissionResponse::from(request).deny(e.to_string());
            response.result.code = e.status_code();
            response
        }
    }
}

async fn evaluate(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    object: &DynamicObject,
    deleter: &dyn StatefulSetDeleter,
) -> Result<Evaluation> {
    let sts = decode_statefulset(object, request.namespace.as_deref())?;
    state.engine.evaluate(&sts, deleter).await
}
