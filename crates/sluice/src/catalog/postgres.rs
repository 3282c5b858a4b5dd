//! `PostgreSQL`-backed catalog store (also speaks to Redshift).
//!
//! The sync `postgres` client runs its own runtime internally, so it is
//! connected and queried only from the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use postgres::{Client, NoTls};
use snafu::ResultExt;

use super::store::{CatalogStore, CatalogTables};
use crate::db::{BlockingDrop, with_connection};
use crate::error::{DatabaseError, PostgresSnafu, TaskJoinSnafu};
use crate::model::{FieldMappingRow, StreamRow};

/// `PostgreSQL` catalog store.
pub struct PostgresCatalogStore {
    client: Arc<Mutex<BlockingDrop<Client>>>,
    tables: CatalogTables,
}

impl PostgresCatalogStore {
    /// Connect with a libpq-style connection string or URI.
    pub async fn connect(connstr: &str, tables: CatalogTables) -> Result<Self, DatabaseError> {
        let connstr = connstr.to_string();
        let client = tokio::task::spawn_blocking(move || Client::connect(&connstr, NoTls))
            .await
            .context(TaskJoinSnafu)?
            .context(PostgresSnafu)?;
        Ok(Self {
            client: Arc::new(Mutex::new(BlockingDrop::new(client))),
            tables,
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn fetch_stream_rows(&self) -> Result<Vec<StreamRow>, DatabaseError> {
        let sql = format!(
            "SELECT CAST(stream_id AS BIGINT), stream_name, file_name_pattern, landing_path, \
             processing_path, rejected_path, archive_path, channel_name, enable_flg, \
             CAST(created_dt AS TIMESTAMP), CAST(updated_dt AS TIMESTAMP) \
             FROM {} WHERE enable_flg = $1",
            self.tables.stream_table
        );
        with_connection(&self.client, move |client| {
            let rows = client.query(sql.as_str(), &[&true]).context(PostgresSnafu)?;
            Ok(rows
                .iter()
                .map(|row| StreamRow {
                    stream_id: row.get(0),
                    stream_name: row.get(1),
                    file_name_pattern: row.get(2),
                    landing_path: row.get(3),
                    processing_path: row.get(4),
                    rejected_path: row.get(5),
                    archive_path: row.get(6),
                    channel_name: row.get(7),
                    enabled: row.get(8),
                    created_at: row.get::<_, Option<NaiveDateTime>>(9),
                    updated_at: row.get::<_, Option<NaiveDateTime>>(10),
                })
                .collect())
        })
        .await
    }

    async fn fetch_field_mapping_rows(&self) -> Result<Vec<FieldMappingRow>, DatabaseError> {
        let sql = format!(
            "SELECT CAST(stream_id AS BIGINT), src_col_nm, enable_flg, \
             CAST(created_dt AS TIMESTAMP), CAST(updated_dt AS TIMESTAMP) \
             FROM {} WHERE enable_flg = $1 AND src_col_nm IS NOT NULL",
            self.tables.field_mapping_table
        );
        with_connection(&self.client, move |client| {
            let rows = client.query(sql.as_str(), &[&true]).context(PostgresSnafu)?;
            Ok(rows
                .iter()
                .map(|row| FieldMappingRow {
                    stream_id: row.get(0),
                    source_column_name: row.get(1),
                    enabled: row.get(2),
                    created_at: row.get::<_, Option<NaiveDateTime>>(3),
                    updated_at: row.get::<_, Option<NaiveDateTime>>(4),
                })
                .collect())
        })
        .await
    }
}
