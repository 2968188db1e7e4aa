//! Deletion Adapters
//!
//! Implementations of the [`StatefulSetDeleter`](crate::domain::ports::StatefulSetDeleter) port:
//! - ApiServer: deletes through the Kubernetes API server
//! - DryRun: logs the delete it would have issued

pub mod api_server;
pub mod dry_run;
#[cfg(test)]
mod recording;

pub use self::api_server::*;
pub use self::dry_run::*;
#[cfg(test)]
pub(crate) use self::recording::RecordingDeleter;
