//! Common error types shared across sluice crates.
//!
//! Storage, configuration and metrics errors live here because both the
//! engine and the application shell produce them.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error: {source}"))]
    AzureConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Storage URL is empty for a job.
    #[snafu(display("Job '{job}' has empty storage url"))]
    EmptyStorageUrl { job: String },

    /// A store connection string is empty for a job.
    #[snafu(display("Job '{job}' has empty {store} url"))]
    EmptyStoreUrl { job: String, store: String },

    /// A configured table name is not a plain SQL identifier.
    #[snafu(display("Job '{job}' has invalid table name '{name}' for {field}"))]
    InvalidIdentifier {
        job: String,
        field: String,
        name: String,
    },

    /// Concurrency must allow at least one file in flight.
    #[snafu(display("Job '{job}' has max_concurrent_files = 0 (must be at least 1)"))]
    ZeroConcurrency { job: String },

    /// Text delimiter must be a single ASCII character.
    #[snafu(display("Job '{job}' has non-ASCII text_delimiter {delimiter:?}"))]
    InvalidDelimiter { job: String, delimiter: char },

    /// No jobs were configured at all.
    #[snafu(display("No jobs configured"))]
    NoJobs,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Duplicate component keys found across config files.
    #[snafu(display("Duplicate job keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics server not initialized (controller accessed before init).
    #[snafu(display("Metrics server not initialized"))]
    NotInitialized,
}

// ============ Job Setup Errors ============

/// Errors that can occur while preparing the job runner.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobSetupError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize metrics.
    #[snafu(display("Failed to initialize metrics: {source}"))]
    Metrics { source: MetricsError },

    /// Failed to open the log file.
    #[snafu(display("Failed to open log file {}: {source}", path.display()))]
    LogFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
