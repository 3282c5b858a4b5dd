//! Shared infrastructure for sluice.
//!
//! Storage access across S3, GCS, Azure and the local filesystem, multi-file
//! YAML configuration, Prometheus metrics, tracing setup, signal handling and
//! the job runner used by the `sluice` binary.

pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod topology;
pub mod tracing;

pub use app::{AppConfig, Application};
pub use config::{
    CliArgs, ComponentKey, ConfigPath, LoggingConfig, Mergeable, MetricsConfig, load_from_paths,
};
pub use error::{ConfigError, JobSetupError, MetricsError, StorageError};
pub use storage::{BackendConfig, StorageProvider, StorageProviderRef};
pub use topology::{Job, JobContext, JobRunner, RunSummary, run_jobs};
