//! Typed rows and values shared by the catalog, audit log and controller.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of an ingestion stream in the catalog.
pub type StreamId = i64;

/// One active ingestion stream after catalog dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDefinition {
    pub stream_id: StreamId,
    pub stream_name: String,
    /// Prefix token matched against the part of a file name before the first `-`.
    pub file_name_pattern: String,
    pub landing_path: String,
    pub processing_path: String,
    pub rejected_path: String,
    pub archive_path: String,
    pub channel_name: String,
}

/// A stream row exactly as returned by a catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRow {
    pub stream_id: StreamId,
    pub stream_name: Option<String>,
    pub file_name_pattern: Option<String>,
    pub landing_path: Option<String>,
    pub processing_path: Option<String>,
    pub rejected_path: Option<String>,
    pub archive_path: Option<String>,
    pub channel_name: Option<String>,
    pub enabled: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A field-mapping row exactly as returned by a catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMappingRow {
    pub stream_id: StreamId,
    pub source_column_name: Option<String>,
    pub enabled: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Processing status recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    ValidationSuccess,
    ValidationFailed,
    EmptyFile,
    IngestionSuccess,
    IngestionFailed,
    MoveFailed,
    ReadFailed,
    /// A status written by some other process; kept verbatim.
    Other(String),
}

impl LoadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LoadStatus::ValidationSuccess => "validation_success",
            LoadStatus::ValidationFailed => "validation_failed",
            LoadStatus::EmptyFile => "empty_file",
            LoadStatus::IngestionSuccess => "ingestion_success",
            LoadStatus::IngestionFailed => "ingestion_failed",
            LoadStatus::MoveFailed => "move_failed",
            LoadStatus::ReadFailed => "read_failed",
            LoadStatus::Other(raw) => raw,
        }
    }

    /// Parse a stored status. Matching is case-insensitive and never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "validation_success" => LoadStatus::ValidationSuccess,
            "validation_failed" => LoadStatus::ValidationFailed,
            "empty_file" => LoadStatus::EmptyFile,
            "ingestion_success" => LoadStatus::IngestionSuccess,
            "ingestion_failed" => LoadStatus::IngestionFailed,
            "move_failed" => LoadStatus::MoveFailed,
            "read_failed" => LoadStatus::ReadFailed,
            _ => LoadStatus::Other(raw.to_string()),
        }
    }

    /// Terminal statuses are never re-validated.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadStatus::ValidationSuccess | LoadStatus::IngestionSuccess
        )
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes written alongside non-successful statuses.
pub mod error_code {
    pub const MISSING_COLUMNS: &str = "Column_Mismatch_with_File";
    pub const UNEXPECTED_COLUMNS: &str = "Column_Mismatch_with_Source_Metada";
    pub const MISSING_AND_UNEXPECTED: &str = "Column_Mismatch_with_File_and_Source_Metadata";
    pub const ALREADY_PROCESSED: &str = "File_Already_Processed";
    pub const MOVE_FAILED: &str = "Route_Move_Failed";
    pub const READ_FAILED: &str = "File_Read_Failed";
}

/// One audit record for a (stream, file) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub stream_id: StreamId,
    pub file_name: String,
    pub load_status: LoadStatus,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub batch_id: BatchId,
    pub channel_name: String,
    pub source_row_count: Option<i64>,
}

/// Whether an audit write creates the row or replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Insert => "insert",
            WriteMode::Update => "update",
        }
    }
}

/// Half-hour batch identifier, `YYYYMMDDHHmm` with minutes `00` or `30`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Batch of the given instant, rounded down to the half hour.
    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        let minute = if time.minute() < 30 { "00" } else { "30" };
        Self(format!("{}{minute}", time.format("%Y%m%d%H")))
    }

    /// Batch of the current local time.
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    /// Wrap a stored batch id without re-deriving it.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical file type derived from the extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileType {
    Csv,
    Text,
    Json,
    Ndjson,
    Parquet,
    Excel,
    Other(String),
}

impl FileType {
    /// `txt` is text and `xlsx` is excel; every other extension names itself.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "txt" => FileType::Text,
            "xlsx" => FileType::Excel,
            "csv" => FileType::Csv,
            "json" => FileType::Json,
            "ndjson" => FileType::Ndjson,
            "parquet" => FileType::Parquet,
            other => FileType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileType::Csv => "csv",
            FileType::Text => "text",
            FileType::Json => "json",
            FileType::Ndjson => "ndjson",
            FileType::Parquet => "parquet",
            FileType::Excel => "excel",
            FileType::Other(ext) => ext,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A landing object matched to a stream.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Full key of the object, relative to the storage root.
    pub key: Path,
    pub file_name: String,
    pub pattern: String,
    pub extension: String,
    pub file_type: FileType,
    pub stream: Arc<StreamDefinition>,
}
