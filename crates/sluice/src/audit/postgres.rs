//! `PostgreSQL`-backed audit store (also speaks to Redshift).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postgres::{Client, NoTls};
use snafu::ResultExt;

use super::store::AuditStore;
use crate::db::{BlockingDrop, with_connection};
use crate::error::{AuditError, DatabaseError, PostgresSnafu, TaskJoinSnafu};
use crate::model::{BatchId, LoadStatus, LogEntry, StreamId};

/// `PostgreSQL` audit log.
pub struct PostgresAuditStore {
    client: Arc<Mutex<BlockingDrop<Client>>>,
    table: String,
}

impl PostgresAuditStore {
    /// Connect and create the log table if it does not exist.
    pub async fn connect(connstr: &str, table: impl Into<String>) -> Result<Self, DatabaseError> {
        let table = table.into();
        let connstr = connstr.to_string();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                stream_id BIGINT NOT NULL,
                file_name VARCHAR(1024) NOT NULL,
                load_status VARCHAR(64) NOT NULL,
                error_code VARCHAR(128),
                error_description VARCHAR(65535),
                batch_id VARCHAR(12),
                channel_name VARCHAR(256),
                source_count BIGINT,
                load_dt TIMESTAMP NOT NULL DEFAULT now()
            );"
        );
        let client = tokio::task::spawn_blocking(move || {
            let mut client = Client::connect(&connstr, NoTls)?;
            client.batch_execute(&ddl)?;
            Ok::<_, postgres::Error>(client)
        })
        .await
        .context(TaskJoinSnafu)?
        .context(PostgresSnafu)?;

        Ok(Self {
            client: Arc::new(Mutex::new(BlockingDrop::new(client))),
            table,
        })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn latest(
        &self,
        stream_id: StreamId,
        file_name: &str,
    ) -> Result<Option<LogEntry>, AuditError> {
        let sql = format!(
            "SELECT load_status, error_code, error_description, batch_id, channel_name, \
             CAST(source_count AS BIGINT) FROM {} WHERE stream_id = $1 AND file_name = $2 \
             ORDER BY load_dt DESC LIMIT 1",
            self.table
        );
        let file_name = file_name.to_string();
        let entry = with_connection(&self.client, move |client| {
            let rows = client
                .query(sql.as_str(), &[&stream_id, &file_name])
                .context(PostgresSnafu)?;
            Ok(rows.first().map(|row| {
                let load_status: String = row.get(0);
                let batch_id: Option<String> = row.get(3);
                let channel_name: Option<String> = row.get(4);
                LogEntry {
                    stream_id,
                    file_name: file_name.clone(),
                    load_status: LoadStatus::parse(&load_status),
                    error_code: row.get(1),
                    error_description: row.get(2),
                    batch_id: BatchId::from_stored(batch_id.unwrap_or_default()),
                    channel_name: channel_name.unwrap_or_default(),
                    source_row_count: row.get(5),
                }
            }))
        })
        .await?;
        Ok(entry)
    }

    async fn insert(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let sql = format!(
            "INSERT INTO {table} (stream_id, file_name, load_status, error_code, \
             error_description, batch_id, channel_name, source_count, load_dt) \
             SELECT $1::BIGINT, $2::VARCHAR, $3::VARCHAR, $4::VARCHAR, $5::VARCHAR, \
             $6::VARCHAR, $7::VARCHAR, $8::BIGINT, now() \
             WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE stream_id = $1 AND file_name = $2)",
            table = self.table
        );
        let row = entry.clone();
        let inserted = with_connection(&self.client, move |client| {
            client
                .execute(
                    sql.as_str(),
                    &[
                        &row.stream_id,
                        &row.file_name,
                        &row.load_status.as_str(),
                        &row.error_code,
                        &row.error_description,
                        &row.batch_id.as_str(),
                        &row.channel_name,
                        &row.source_row_count,
                    ],
                )
                .context(PostgresSnafu)
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
            "UPDATE {} SET load_status = $3, error_code = $4, error_description = $5, \
             batch_id = $6, channel_name = $7, source_count = $8, load_dt = now() \
             WHERE stream_id = $1 AND file_name = $2",
            self.table
        );
        let row = entry.clone();
        let updated = with_connection(&self.client, move |client| {
            client
                .execute(
                    sql.as_str(),
                    &[
                        &row.stream_id,
                        &row.file_name,
                        &row.load_status.as_str(),
                        &row.error_code,
                        &row.error_description,
                        &row.batch_id.as_str(),
                        &row.channel_name,
                        &row.source_row_count,
                    ],
                )
                .context(PostgresSnafu)
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
