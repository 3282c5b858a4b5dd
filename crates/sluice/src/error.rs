//! Error types for the sluice engine.
//!
//! Run-fatal errors (`CatalogError`, `RunError`) abort one job; per-file
//! errors (`AuditError`, `RouteError`, `ReadError`) are caught by the
//! controller and recorded against the file.

use snafu::prelude::*;

pub use sluice_core::error::{ConfigError, JobSetupError, StorageError};

/// Errors raised by the SQLite / PostgreSQL adapters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    /// SQLite call failed.
    #[snafu(display("SQLite error: {source}"))]
    Sqlite { source: rusqlite::Error },

    /// PostgreSQL call failed.
    #[snafu(display("PostgreSQL error: {source}"))]
    Postgres { source: postgres::Error },

    /// A previous holder of the connection panicked.
    #[snafu(display("Database connection lock poisoned"))]
    LockPoisoned,

    /// The blocking database task did not complete.
    #[snafu(display("Database task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },

    /// A row could not be decoded into its typed form.
    #[snafu(display("Malformed row in {table}: {message}"))]
    MalformedRow { table: String, message: String },
}

/// Errors loading the metadata catalog. Both are run-fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    /// The catalog query could not execute.
    #[snafu(display("Catalog unavailable: {source}"))]
    Unavailable { source: DatabaseError },

    /// Active rows violate a catalog invariant.
    #[snafu(display("Invalid catalog: {message}"))]
    Invalid { message: String },
}

/// Errors reading or writing the audit log. Per-file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuditError {
    /// The audit store rejected or failed the statement.
    #[snafu(display("Audit store error: {source}"))]
    Store { source: DatabaseError },

    /// Insert found an existing row for the key.
    #[snafu(display("Log row already exists for stream {stream_id}, file '{file_name}'"))]
    AlreadyExists { stream_id: i64, file_name: String },

    /// Update found no row for the key.
    #[snafu(display("No log row to update for stream {stream_id}, file '{file_name}'"))]
    Missing { stream_id: i64, file_name: String },
}

/// Errors moving a file between prefixes. Per-file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RouteError {
    /// Copy failed; the source object is untouched.
    #[snafu(display("Failed to copy {from} to {to}: {source}"))]
    Copy {
        from: String,
        to: String,
        source: StorageError,
    },

    /// Copy succeeded but the source could not be deleted; the file now
    /// exists in both places.
    #[snafu(display("Copied to {to} but failed to delete {from}: {source}"))]
    Delete {
        from: String,
        to: String,
        source: StorageError,
    },
}

impl RouteError {
    /// True when the file exists at the destination as well as the source.
    pub fn is_duplicated(&self) -> bool {
        matches!(self, RouteError::Delete { .. })
    }
}

/// Errors fetching or parsing a landing file. Per-file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReadError {
    /// The object could not be fetched.
    #[snafu(display("Failed to fetch {key}: {source}"))]
    Fetch { key: String, source: StorageError },

    /// No reader exists for this logical file type.
    #[snafu(display("Unsupported file type '{file_type}'"))]
    UnsupportedFileType { file_type: String },

    /// Delimited text could not be parsed.
    #[snafu(display("Failed to parse delimited file: {source}"))]
    Delimited { source: csv::Error },

    /// JSON could not be parsed.
    #[snafu(display("Failed to parse JSON: {source}"))]
    Json { source: serde_json::Error },

    /// JSON parsed but is not an array of objects or NDJSON objects.
    #[snafu(display("JSON document is not a list of records: {message}"))]
    JsonShape { message: String },

    /// Parquet footer could not be read.
    #[snafu(display("Failed to read parquet metadata: {source}"))]
    Parquet {
        source: parquet::errors::ParquetError,
    },

    /// The xlsx workbook or its first sheet could not be opened.
    #[snafu(display("Failed to read workbook: {source}"))]
    Workbook { source: calamine::XlsxError },

    /// The workbook has no worksheets.
    #[snafu(display("Workbook has no worksheets"))]
    EmptyWorkbook,
}

/// Errors delivering a run notification. Logged, never propagated.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NotifyError {
    /// The notification command could not be started.
    #[snafu(display("Failed to run '{command}': {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The body could not be written to the command's stdin.
    #[snafu(display("Failed to write body to '{command}': {source}"))]
    Stdin {
        command: String,
        source: std::io::Error,
    },

    /// The command ran and reported failure.
    #[snafu(display("'{command}' exited with {status}"))]
    Exit { command: String, status: String },
}

/// Run-fatal errors of one controller run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// The catalog could not be loaded.
    #[snafu(display("Failed to load catalog: {source}"))]
    Catalog { source: CatalogError },

    /// A landing prefix could not be listed.
    #[snafu(display("Failed to list landing path '{landing_path}': {source}"))]
    Discovery {
        landing_path: String,
        source: StorageError,
    },
}

/// Top-level job errors (catastrophic for the job).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// Storage could not be initialized.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// A catalog or audit store could not be opened.
    #[snafu(display("Failed to open {store} store: {source}"))]
    StoreOpen {
        store: &'static str,
        source: DatabaseError,
    },

    /// The run itself failed.
    #[snafu(display("Run failed: {source}"))]
    Run { source: RunError },
}

impl From<StorageError> for JobError {
    fn from(source: StorageError) -> Self {
        JobError::Storage { source }
    }
}

impl From<RunError> for JobError {
    fn from(source: RunError) -> Self {
        JobError::Run { source }
    }
}

impl From<CatalogError> for RunError {
    fn from(source: CatalogError) -> Self {
        RunError::Catalog { source }
    }
}

impl From<DatabaseError> for AuditError {
    fn from(source: DatabaseError) -> Self {
        AuditError::Store { source }
    }
}
