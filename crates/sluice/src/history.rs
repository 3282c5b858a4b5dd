//! Prior-outcome lookup deciding whether a file is validated again.

use std::sync::Arc;

use crate::audit::AuditStore;
use crate::error::AuditError;
use crate::model::{LogEntry, StreamId, WriteMode};

/// What the audit log says about a (stream, file) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    /// False only when the latest status is terminal.
    pub must_validate: bool,
    pub prior: Option<LogEntry>,
}

impl History {
    /// Insert on first sight, Update afterwards.
    pub fn mode(&self) -> WriteMode {
        if self.prior.is_some() {
            WriteMode::Update
        } else {
            WriteMode::Insert
        }
    }

    fn from_prior(prior: Option<LogEntry>) -> Self {
        let must_validate = prior
            .as_ref()
            .is_none_or(|entry| !entry.load_status.is_terminal());
        Self {
            must_validate,
            prior,
        }
    }
}

/// Reads the latest audit row for a key.
#[derive(Clone)]
pub struct HistoryResolver {
    store: Arc<dyn AuditStore>,
}

impl HistoryResolver {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<History, AuditError> {
        let prior = self.store.latest(stream_id, file_name).await?;
        Ok(History::from_prior(prior))
    }
}
