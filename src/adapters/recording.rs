//! In-memory deleter for tests

use crate::domain::ports::{DeletePropagation, DeleteTarget, StatefulSetDeleter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::core::ErrorResponse;
use parking_lot::Mutex;

/// What each recorded call does after it is recorded
#[derive(Debug, Clone, Default)]
enum Behavior {
    #[default]
    Succeed,
    Fail(String),
    /// API server answers with this status code and reason
    ApiError(u16, String),
    /// Never completes
    Hang,
}

/// Records every delete call, optionally failing each one
#[derive(Debug, Default)]
pub(crate) struct RecordingDeleter {
    calls: Mutex<Vec<(DeleteTarget, DeletePropagation)>>,
    behavior: Behavior,
    dry_run: bool,
}

impl RecordingDeleter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A deleter whose calls all fail with `reason`
    pub(crate) fn failing(reason: &str) -> Self {
        Self::with_behavior(Behavior::Fail(reason.to_string()))
    }

    /// A deleter whose calls all fail as an API server error
    pub(crate) fn failing_api(code: u16, reason: &str) -> Self {
        Self::with_behavior(Behavior::ApiError(code, reason.to_string()))
    }

    /// A deleter whose calls never complete
    pub(crate) fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    /// A deleter that reports itself as a server-side dry run
    pub(crate) fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<(DeleteTarget, DeletePropagation)> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StatefulSetDeleter for RecordingDeleter {
    async fn delete(&self, target: &DeleteTarget, propagation: DeletePropagation) -> Result<()> {
        self.calls.lock().push((target.clone(), propagation));
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(reason) => Err(Error::Internal(reason.clone())),
            Behavior::ApiError(code, reason) => Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("delete of {} failed", target),
                reason: reason.clone(),
                code: *code,
            }))),
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
