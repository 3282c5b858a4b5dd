//! `SQLite`-backed catalog store.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use snafu::ResultExt;

use super::store::{CatalogStore, CatalogTables};
use crate::db::{SQLITE_DATETIME_FMT, parse_sqlite_datetime, with_connection};
use crate::error::{DatabaseError, SqliteSnafu};
use crate::model::{FieldMappingRow, StreamRow};

/// `SQLite` catalog store.
///
/// Create with [`SqliteCatalogStore::open`] for a database file or
/// [`SqliteCatalogStore::in_memory`] for tests.
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
    tables: CatalogTables,
}

impl SqliteCatalogStore {
    /// Open an existing catalog database.
    pub fn open(path: &Path, tables: CatalogTables) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).context(SqliteSnafu)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tables,
        })
    }

    /// Create an in-memory catalog with empty tables.
    pub fn in_memory(tables: CatalogTables) -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().context(SqliteSnafu)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            tables,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Create the catalog tables if missing (local setups and tests).
    pub fn create_tables(&self) -> Result<(), DatabaseError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {streams} (
                stream_id INTEGER NOT NULL,
                stream_name TEXT,
                file_name_pattern TEXT,
                landing_path TEXT,
                processing_path TEXT,
                rejected_path TEXT,
                archive_path TEXT,
                channel_name TEXT,
                enable_flg INTEGER NOT NULL DEFAULT 1,
                created_dt TEXT,
                updated_dt TEXT
            );
            CREATE TABLE IF NOT EXISTS {mappings} (
                stream_id INTEGER NOT NULL,
                src_col_nm TEXT,
                enable_flg INTEGER NOT NULL DEFAULT 1,
                created_dt TEXT,
                updated_dt TEXT
            );",
            streams = self.tables.stream_table,
            mappings = self.tables.field_mapping_table,
        );
        self.lock()?.execute_batch(&ddl).context(SqliteSnafu)
    }

    /// Insert one stream row.
    pub fn insert_stream_row(&self, row: &StreamRow) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (stream_id, stream_name, file_name_pattern, landing_path, \
             processing_path, rejected_path, archive_path, channel_name, enable_flg, \
             created_dt, updated_dt) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            self.tables.stream_table
        );
        self.lock()?
            .execute(
                &sql,
                rusqlite::params![
                    row.stream_id,
                    row.stream_name,
                    row.file_name_pattern,
                    row.landing_path,
                    row.processing_path,
                    row.rejected_path,
                    row.archive_path,
                    row.channel_name,
                    row.enabled,
                    row.created_at
                        .map(|t| t.format(SQLITE_DATETIME_FMT).to_string()),
                    row.updated_at
                        .map(|t| t.format(SQLITE_DATETIME_FMT).to_string()),
                ],
            )
            .context(SqliteSnafu)?;
        Ok(())
    }

    /// Insert one field-mapping row.
    pub fn insert_field_mapping_row(&self, row: &FieldMappingRow) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (stream_id, src_col_nm, enable_flg, created_dt, updated_dt) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.tables.field_mapping_table
        );
        self.lock()?
            .execute(
                &sql,
                rusqlite::params![
                    row.stream_id,
                    row.source_column_name,
                    row.enabled,
                    row.created_at
                        .map(|t| t.format(SQLITE_DATETIME_FMT).to_string()),
                    row.updated_at
                        .map(|t| t.format(SQLITE_DATETIME_FMT).to_string()),
                ],
            )
            .context(SqliteSnafu)?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn fetch_stream_rows(&self) -> Result<Vec<StreamRow>, DatabaseError> {
        let sql = format!(
            "SELECT stream_id, stream_name, file_name_pattern, landing_path, processing_path, \
             rejected_path, archive_path, channel_name, enable_flg, created_dt, updated_dt \
             FROM {}",
            self.tables.stream_table
        );
        with_connection(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&sql).context(SqliteSnafu)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(StreamRow {
                        stream_id: row.get(0)?,
                        stream_name: row.get(1)?,
                        file_name_pattern: row.get(2)?,
                        landing_path: row.get(3)?,
                        processing_path: row.get(4)?,
                        rejected_path: row.get(5)?,
                        archive_path: row.get(6)?,
                        channel_name: row.get(7)?,
                        enabled: row.get(8)?,
                        created_at: parse_sqlite_datetime(row.get(9)?),
                        updated_at: parse_sqlite_datetime(row.get(10)?),
                    })
                })
                .context(SqliteSnafu)?;
            rows.collect::<Result<Vec<_>, _>>().context(SqliteSnafu)
        })
        .await
    }

    async fn fetch_field_mapping_rows(&self) -> Result<Vec<FieldMappingRow>, DatabaseError> {
        let sql = format!(
            "SELECT stream_id, src_col_nm, enable_flg, created_dt, updated_dt FROM {}",
            self.tables.field_mapping_table
        );
        with_connection(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&sql).context(SqliteSnafu)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(FieldMappingRow {
                        stream_id: row.get(0)?,
                        source_column_name: row.get(1)?,
                        enabled: row.get(2)?,
                        created_at: parse_sqlite_datetime(row.get(3)?),
                        updated_at: parse_sqlite_datetime(row.get(4)?),
                    })
                })
                .context(SqliteSnafu)?;
            rows.collect::<Result<Vec<_>, _>>().context(SqliteSnafu)
        })
        .await
    }
}
