//! Audit log: the only resumability state of the engine.

mod postgres;
mod sqlite;
mod store;

pub use postgres::PostgresAuditStore;
pub use sqlite::SqliteAuditStore;
pub use store::AuditStore;

use std::sync::Arc;

use tracing::debug;

use crate::error::AuditError;
use crate::metrics::events::{AuditWrite, WriteStatus};
use crate::model::{LogEntry, WriteMode};
use sluice_core::emit;

/// Writes outcomes to the audit store in the mode chosen by the history
/// lookup.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    job: String,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, job: impl Into<String>) -> Self {
        Self {
            store,
            job: job.into(),
        }
    }

    /// Persist `entry` with an Insert (first sight) or Update (retry).
    pub async fn record(&self, entry: &LogEntry, mode: WriteMode) -> Result<(), AuditError> {
        let result = match mode {
            WriteMode::Insert => self.store.insert(entry).await,
            WriteMode::Update => self.store.update(entry).await,
        };

        emit!(AuditWrite {
            job: self.job.clone(),
            mode,
            status: if result.is_ok() {
                WriteStatus::Success
            } else {
                WriteStatus::Error
            },
        });

        if result.is_ok() {
            debug!(
                target = %self.job,
                stream_id = entry.stream_id,
                file = %entry.file_name,
                status = %entry.load_status,
                mode = mode.as_str(),
                "Audit row written"
            );
        }
        result
    }
}
