//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence. Events implement
//! `InternalEvent`, which logs at trace level and records the metric.
//! Engine-specific events (files routed, audit writes) live in the engine
//! crate and implement the same trait.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Head,
    Put,
    Copy,
    Delete,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Head => "head",
            StorageOperation::Put => "put",
            StorageOperation::Copy => "copy",
            StorageOperation::Delete => "delete",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "sluice_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "sluice_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Job events
// ============================================================================

/// Final status of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed,
    Panicked,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Panicked => "panicked",
        }
    }
}

/// Event emitted when a job finishes.
pub struct JobCompleted {
    pub job: String,
    pub status: JobStatus,
}

impl InternalEvent for JobCompleted {
    fn emit(self) {
        trace!(job = %self.job, status = self.status.as_str(), "Job completed");
        counter!(
            "sluice_jobs_completed_total",
            "job" => self.job,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the wall-clock duration of a job run.
pub struct JobDuration {
    pub job: String,
    pub duration: Duration,
}

impl InternalEvent for JobDuration {
    fn emit(self) {
        trace!(job = %self.job, duration_ms = self.duration.as_millis(), "Job duration");
        histogram!("sluice_job_duration_seconds", "job" => self.job)
            .record(self.duration.as_secs_f64());
    }
}
