//! `SQLite`-backed audit store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use snafu::ResultExt;

use super::store::AuditStore;
use crate::db::{SQLITE_DATETIME_FMT, with_connection};
use crate::error::{AuditError, DatabaseError, SqliteSnafu};
use crate::model::{BatchId, LoadStatus, LogEntry, StreamId};

/// `SQLite` audit log.
///
/// The log table is created on open if it does not exist.
pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteAuditStore {
    /// Open or create an audit database at `path`.
    pub fn open(path: &Path, table: impl Into<String>) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            // Surfaced by Connection::open below if this fails.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path).context(SqliteSnafu)?;
        Self::with_connection(conn, table.into())
    }

    /// Create an in-memory audit store (for testing).
    pub fn in_memory(table: impl Into<String>) -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().context(SqliteSnafu)?;
        Self::with_connection(conn, table.into())
    }

    fn with_connection(conn: Connection, table: String) -> Result<Self, DatabaseError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                stream_id INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                load_status TEXT NOT NULL,
                error_code TEXT,
                error_description TEXT,
                batch_id TEXT,
                channel_name TEXT,
                source_count INTEGER,
                load_dt TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_{index}_key ON {table} (stream_id, file_name);",
            index = table.replace('.', "_"),
        ))
        .context(SqliteSnafu)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table,
        })
    }

    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Number of rows stored for a key.
    pub async fn row_count(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<i64, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE stream_id = ?1 AND file_name = ?2",
            self.table
        );
        let file_name = file_name.to_string();
        with_connection(&self.conn, move |conn| {
            conn.query_row(&sql, rusqlite::params![stream_id, file_name], |row| {
                row.get(0)
            })
            .context(SqliteSnafu)
        })
        .await
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn latest(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<Option<LogEntry>, AuditError> {
        let sql = format!(
            "SELECT load_status, error_code, error_description, batch_id, channel_name, \
             source_count FROM {} WHERE stream_id = ?1 AND file_name = ?2 \
             ORDER BY load_dt DESC LIMIT 1",
            self.table
        );
        let file_name = file_name.to_string();
        let entry = with_connection(&self.conn, move |conn| {
            conn.query_row(&sql, rusqlite::params![stream_id, file_name], |row| {
                let load_status: String = row.get(0)?;
                let batch_id: Option<String> = row.get(3)?;
                let channel_name: Option<String> = row.get(4)?;
                Ok(LogEntry {
                    stream_id,
                    file_name: file_name.clone(),
                    load_status: LoadStatus::parse(&load_status),
                    error_code: row.get(1)?,
                    error_description: row.get(2)?,
                    batch_id: BatchId::from_stored(batch_id.unwrap_or_default()),
                    channel_name: channel_name.unwrap_or_default(),
                    source_row_count: row.get(5)?,
                })
            })
            .optional()
            .context(SqliteSnafu)
        })
        .await?;
        Ok(entry)
    }

    async fn insert(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let sql = format!(
            "INSERT INTO {table} (stream_id, file_name, load_status, error_code, \
             error_description, batch_id, channel_name, source_count, load_dt) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9 \
             WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE stream_id = ?1 AND file_name = ?2)",
            table = self.table
        );
        let row = entry.clone();
        let inserted = with_connection(&self.conn, move |conn| {
            conn.execute(
                &sql,
                rusqlite::params![
                    row.stream_id,
                    row.file_name,
                    row.load_status.as_str(),
                    row.error_code,
                    row.error_description,
                    row.batch_id.as_str(),
                    row.channel_name,
                    row.source_row_count,
                    Self::now_sqlite(),
                ],
            )
            .context(SqliteSnafu)
        })
        .await?;

        if inserted == 0 {
            return Err(AuditError::AlreadyExists {
                stream_id: entry.stream_id,
                file_name: entry.file_name.clone(),
            });
        }
        Ok(())
    }

    async fn update(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let sql = format!(
            "UPDATE {} SET load_status = ?3, error_code = ?4, error_description = ?5, \
             batch_id = ?6, channel_name = ?7, source_count = ?8, load_dt = ?9 \
             WHERE stream_id = ?1 AND file_name = ?2",
            self.table
        );
        let row = entry.clone();
        let updated = with_connection(&self.conn, move |conn| {
            conn.execute(
                &sql,
                rusqlite::params![
                    row.stream_id,
                    row.file_name,
                    row.load_status.as_str(),
                    row.error_code,
                    row.error_description,
                    row.batch_id.as_str(),
                    row.channel_name,
                    row.source_row_count,
                    Self::now_sqlite(),
                ],
            )
            .context(SqliteSnafu)
        })
        .await?;

        if updated == 0 {
            return Err(AuditError::Missing {
                stream_id: entry.stream_id,
                file_name: entry.file_name.clone(),
            });
        }
        Ok(())
    }
}
