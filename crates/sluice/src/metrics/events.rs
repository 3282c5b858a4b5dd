//! Internal events for engine metrics emission.
//!
//! Every event carries a `job` label so multi-job deployments can be told
//! apart on one Prometheus endpoint.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use crate::model::WriteMode;
pub use sluice_core::metrics::events::InternalEvent;

// ============================================================================
// Discovery events
// ============================================================================

/// Event emitted after a landing prefix has been listed.
pub struct FilesDiscovered {
    pub job: String,
    /// Objects found directly under the prefix.
    pub listed: u64,
    /// Objects whose pattern matched a catalog stream.
    pub matched: u64,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(
            job = %self.job,
            listed = self.listed,
            matched = self.matched,
            "Files discovered"
        );
        counter!("sluice_files_listed_total", "job" => self.job.clone()).increment(self.listed);
        counter!("sluice_files_matched_total", "job" => self.job).increment(self.matched);
    }
}

/// Event emitted with the number of active streams after catalog load.
pub struct CatalogLoaded {
    pub job: String,
    pub streams: usize,
}

impl InternalEvent for CatalogLoaded {
    fn emit(self) {
        trace!(job = %self.job, streams = self.streams, "Catalog loaded");
        gauge!("sluice_catalog_streams", "job" => self.job).set(self.streams as f64);
    }
}

// ============================================================================
// Per-file events
// ============================================================================

/// Where a file ended up (or why it stayed put).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Processing,
    Rejected,
    Archive,
    /// Dry run: classified but not moved.
    Unmoved,
}

impl RouteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOutcome::Processing => "processing",
            RouteOutcome::Rejected => "rejected",
            RouteOutcome::Archive => "archive",
            RouteOutcome::Unmoved => "unmoved",
        }
    }
}

/// Event emitted when a file has been routed.
pub struct FileRouted {
    pub job: String,
    pub stream: String,
    pub outcome: RouteOutcome,
}

impl InternalEvent for FileRouted {
    fn emit(self) {
        trace!(
            job = %self.job,
            stream = %self.stream,
            outcome = self.outcome.as_str(),
            "File routed"
        );
        counter!(
            "sluice_files_routed_total",
            "job" => self.job,
            "stream" => self.stream,
            "outcome" => self.outcome.as_str()
        )
        .increment(1);
    }
}

/// Stage of per-file processing that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    History,
    Read,
    Move,
    Audit,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::History => "history",
            FailureStage::Read => "read",
            FailureStage::Move => "move",
            FailureStage::Audit => "audit",
        }
    }
}

/// Event emitted when processing of one file failed.
pub struct FileFailed {
    pub job: String,
    pub stage: FailureStage,
}

impl InternalEvent for FileFailed {
    fn emit(self) {
        trace!(job = %self.job, stage = self.stage.as_str(), "File failed");
        counter!(
            "sluice_file_failures_total",
            "job" => self.job,
            "stage" => self.stage.as_str()
        )
        .increment(1);
    }
}

// ============================================================================
// Audit events
// ============================================================================

/// Status of an audit write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Success,
    Error,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Success => "success",
            WriteStatus::Error => "error",
        }
    }
}

/// Event emitted for every audit log write.
pub struct AuditWrite {
    pub job: String,
    pub mode: WriteMode,
    pub status: WriteStatus,
}

impl InternalEvent for AuditWrite {
    fn emit(self) {
        trace!(
            job = %self.job,
            mode = self.mode.as_str(),
            status = self.status.as_str(),
            "Audit write"
        );
        counter!(
            "sluice_audit_writes_total",
            "job" => self.job,
            "mode" => self.mode.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

// ============================================================================
// Run events
// ============================================================================

/// Event emitted with the duration of one controller run.
pub struct RunDuration {
    pub job: String,
    pub duration: Duration,
}

impl InternalEvent for RunDuration {
    fn emit(self) {
        trace!(job = %self.job, duration_ms = self.duration.as_millis(), "Run duration");
        histogram!("sluice_run_duration_seconds", "job" => self.job)
            .record(self.duration.as_secs_f64());
    }
}
