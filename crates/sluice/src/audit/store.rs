//! Audit store seam.

use async_trait::async_trait;

use crate::error::AuditError;
use crate::model::{LogEntry, StreamId};

/// Keyed persistence of the current status of each (stream, file) pair.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// The most recent row for the key, if any.
    async fn latest(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<Option<LogEntry>, AuditError>;

    /// Insert the first row for the key. Fails with `AlreadyExists` if a
    /// row is already present.
    async fn insert(&self, entry: &LogEntry) -> Result<(), AuditError>;

    /// Replace the current row for the key. Fails with `Missing` if there
    /// is none.
    async fn update(&self, entry: &LogEntry) -> Result<(), AuditError>;
}
