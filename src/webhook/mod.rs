//! Mutating Admission Webhook
//!
//! Receives AdmissionReview requests for StatefulSet updates and runs them
//! through the resize decision engine. The webhook never patches the object;
//! its only effect is the orphan delete the engine may issue.

pub mod handler;
pub mod server;

pub use server::*;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::domain::ports::StatefulSetDeleterRef;
use crate::engine::ResizeEngine;
use crate::metrics::WebhookMetrics;

/// Path the webhook is registered under
pub const MUTATE_PATH: &str = "/mutate--v1-statefulset";

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Decision engine
    pub engine: ResizeEngine,
    /// Deleter used for non-dry-run admissions
    pub deleter: StatefulSetDeleterRef,
    /// Admission metrics
    pub metrics: Arc<WebhookMetrics>,
}

impl WebhookState {
    /// Create a new webhook state
    pub fn new(
        engine: ResizeEngine,
        deleter: StatefulSetDeleterRef,
        metrics: Arc<WebhookMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            deleter,
            metrics,
        })
    }
}

/// Create the webhook router
///
/// - POST /mutate--v1-statefulset - evaluate a StatefulSet update
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(handler::mutate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the probe router serving health and metrics endpoints
pub fn probe_router(metrics: Arc<WebhookMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<WebhookMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
