//! Routing decisions and the copy-then-delete move.

use std::sync::Arc;

use object_store::path::Path;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::config::AlreadyProcessedPolicy;
use crate::error::{CopySnafu, DeleteSnafu, RouteError};
use crate::metrics::events::RouteOutcome;
use crate::model::StreamDefinition;
use sluice_core::StorageProvider;

/// Why a file leaves landing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No data rows (or only null ones).
    Empty,
    /// History shows a terminal status.
    AlreadyProcessed,
    Passed,
    Failed,
}

impl Decision {
    /// Which stream prefix the file goes to.
    pub fn outcome(&self, policy: AlreadyProcessedPolicy) -> RouteOutcome {
        match self {
            Decision::Empty => RouteOutcome::Archive,
            Decision::AlreadyProcessed => match policy {
                AlreadyProcessedPolicy::Rejected => RouteOutcome::Rejected,
                AlreadyProcessedPolicy::Archive => RouteOutcome::Archive,
            },
            Decision::Passed => RouteOutcome::Processing,
            Decision::Failed => RouteOutcome::Rejected,
        }
    }
}

/// Destination prefix of `outcome` for `stream`.
pub fn destination_prefix(stream: &StreamDefinition, outcome: RouteOutcome) -> &str {
    match outcome {
        RouteOutcome::Processing => &stream.processing_path,
        RouteOutcome::Rejected => &stream.rejected_path,
        RouteOutcome::Archive => &stream.archive_path,
        RouteOutcome::Unmoved => &stream.landing_path,
    }
}

/// `prefix/<file name of key>`. A trailing `/` on the prefix is optional.
pub fn destination_key(prefix: &str, key: &Path) -> Path {
    Path::from(prefix).parts().chain(key.parts().last()).collect()
}

/// Moves files within one bucket.
#[derive(Clone)]
pub struct Router {
    storage: Arc<StorageProvider>,
}

impl Router {
    pub fn new(storage: Arc<StorageProvider>) -> Self {
        Self { storage }
    }

    /// Copy `from` to `to`, then delete `from`.
    ///
    /// The source is deleted only after the copy succeeded, so a failure
    /// can leave the file in both places but never in neither.
    pub async fn move_file(&self, from: &Path, to: &Path) -> Result<(), RouteError> {
        self.storage.copy(from, to).await.context(CopySnafu {
            from: from.to_string(),
            to: to.to_string(),
        })?;

        if let Err(source) = self.storage.delete(from).await {
            warn!(from = %from, to = %to, error = %source, "File duplicated: source delete failed");
            return Err(source).context(DeleteSnafu {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        debug!(from = %from, to = %to, "File moved");
        Ok(())
    }
}
