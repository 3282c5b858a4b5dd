//! Metadata catalog: the run's read-only snapshot of active streams and
//! their expected columns.

mod postgres;
mod sqlite;
mod store;

pub use postgres::PostgresCatalogStore;
pub use sqlite::SqliteCatalogStore;
pub use store::{CatalogStore, CatalogTables};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::error::{CatalogError, InvalidSnafu, UnavailableSnafu};
use crate::model::{FieldMappingRow, StreamDefinition, StreamId, StreamRow};

static NO_COLUMNS: BTreeSet<String> = BTreeSet::new();

/// A landing prefix together with the patterns of the streams that use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPath {
    pub path: String,
    pub patterns: Vec<String>,
}

/// Immutable catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_pattern: IndexMap<String, Arc<StreamDefinition>>,
    columns: HashMap<StreamId, BTreeSet<String>>,
}

/// Load streams and field mappings in one snapshot and build the catalog.
pub async fn load_catalog(store: &dyn CatalogStore) -> Result<Catalog, CatalogError> {
    let streams = store.fetch_stream_rows().await.context(UnavailableSnafu)?;
    let mappings = store
        .fetch_field_mapping_rows()
        .await
        .context(UnavailableSnafu)?;

    debug!(
        stream_rows = streams.len(),
        mapping_rows = mappings.len(),
        "Fetched catalog rows"
    );

    Catalog::from_rows(streams, mappings)
}

/// Ordering key: the row's latest timestamp, then update time, then creation
/// time. An absent time sorts before any present one.
fn recency(
    row: &StreamRow,
) -> (
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
    Option<NaiveDateTime>,
) {
    (
        row.updated_at.max(row.created_at),
        row.updated_at,
        row.created_at,
    )
}

fn required(
    value: Option<String>,
    field: &str,
    stream_id: StreamId,
) -> Result<String, CatalogError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CatalogError::Invalid {
            message: format!("stream {stream_id} has an empty {field}"),
        }),
    }
}

impl Catalog {
    /// Build a catalog from raw store rows.
    ///
    /// Disabled rows are ignored. Per `stream_id` the row whose most recent
    /// timestamp (update or creation) is latest wins; update time and then
    /// creation time break ties, and on an exact tie the first row seen is
    /// kept.
    pub fn from_rows(
        streams: Vec<StreamRow>,
        mappings: Vec<FieldMappingRow>,
    ) -> Result<Self, CatalogError> {
        let mut latest: IndexMap<StreamId, StreamRow> = IndexMap::new();
        for row in streams.into_iter().filter(|row| row.enabled) {
            match latest.get(&row.stream_id) {
                Some(current) if recency(&row) <= recency(current) => {}
                _ => {
                    latest.insert(row.stream_id, row);
                }
            }
        }
        latest.sort_keys();

        let mut by_pattern: IndexMap<String, Arc<StreamDefinition>> = IndexMap::new();
        for (stream_id, row) in latest {
            let definition = StreamDefinition {
                stream_id,
                stream_name: required(row.stream_name, "stream_name", stream_id)?,
                file_name_pattern: required(row.file_name_pattern, "file_name_pattern", stream_id)?,
                landing_path: required(row.landing_path, "landing_path", stream_id)?,
                processing_path: required(row.processing_path, "processing_path", stream_id)?,
                rejected_path: required(row.rejected_path, "rejected_path", stream_id)?,
                archive_path: required(row.archive_path, "archive_path", stream_id)?,
                channel_name: row.channel_name.unwrap_or_default().trim().to_string(),
            };

            if definition.file_name_pattern.contains('-') {
                warn!(
                    stream_id,
                    pattern = %definition.file_name_pattern,
                    "Pattern contains '-' and can never match a file name token"
                );
            }

            if let Some(other) = by_pattern.get(&definition.file_name_pattern) {
                return InvalidSnafu {
                    message: format!(
                        "streams {} and {} share file_name_pattern '{}'",
                        other.stream_id, stream_id, definition.file_name_pattern
                    ),
                }
                .fail();
            }
            by_pattern.insert(definition.file_name_pattern.clone(), Arc::new(definition));
        }

        let active: BTreeSet<StreamId> = by_pattern.values().map(|s| s.stream_id).collect();
        let mut columns: HashMap<StreamId, BTreeSet<String>> = HashMap::new();
        for row in mappings.into_iter().filter(|row| row.enabled) {
            if !active.contains(&row.stream_id) {
                continue;
            }
            let Some(name) = row.source_column_name else {
                continue;
            };
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            columns.entry(row.stream_id).or_default().insert(name);
        }

        for stream in by_pattern.values() {
            if !columns.contains_key(&stream.stream_id) {
                warn!(
                    stream_id = stream.stream_id,
                    stream = %stream.stream_name,
                    "Stream has no field mappings; every file will fail validation"
                );
            }
        }

        Ok(Self {
            by_pattern,
            columns,
        })
    }

    /// Stream whose `file_name_pattern` equals `pattern`.
    pub fn lookup(&self, pattern: &str) -> Option<&Arc<StreamDefinition>> {
        self.by_pattern.get(pattern)
    }

    /// Lower-cased expected columns of a stream (empty if it has none).
    pub fn expected_columns(&self, stream_id: StreamId) -> &BTreeSet<String> {
        self.columns.get(&stream_id).unwrap_or(&NO_COLUMNS)
    }

    /// Every known pattern, in stream id order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.by_pattern.keys().map(String::as_str)
    }

    /// Distinct landing prefixes (ignoring a trailing `/`) with their patterns.
    pub fn landing_paths(&self) -> Vec<LandingPath> {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for stream in self.by_pattern.values() {
            let path = stream.landing_path.trim_end_matches('/').to_string();
            grouped
                .entry(path)
                .or_default()
                .push(stream.file_name_pattern.clone());
        }
        grouped
            .into_iter()
            .map(|(path, patterns)| LandingPath { path, patterns })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn ts(raw: &str) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap())
    }

    pub(crate) fn stream_row(stream_id: StreamId, pattern: &str) -> StreamRow {
        StreamRow {
            stream_id,
            stream_name: Some(format!("{pattern}_stream")),
            file_name_pattern: Some(pattern.to_string()),
            landing_path: Some("landing".to_string()),
            processing_path: Some("processing".to_string()),
            rejected_path: Some("rejected".to_string()),
            archive_path: Some("archive".to_string()),
            channel_name: Some("saas".to_string()),
            enabled: true,
            created_at: ts("2024-01-01 00:00:00"),
            updated_at: None,
        }
    }

    pub(crate) fn mapping(stream_id: StreamId, column: &str) -> FieldMappingRow {
        FieldMappingRow {
            stream_id,
            source_column_name: Some(column.to_string()),
            enabled: true,
            created_at: ts("2024-01-01 00:00:00"),
            updated_at: None,
        }
    }

    #[test]
    fn test_latest_row_wins_per_stream() {
        let mut old = stream_row(1, "orders");
        old.landing_path = Some("old_landing".to_string());
        old.updated_at = ts("2024-02-01 00:00:00");

        let mut newest = stream_row(1, "orders");
        newest.landing_path = Some("new_landing".to_string());
        newest.updated_at = ts("2024-03-01 00:00:00");

        let catalog = Catalog::from_rows(vec![old, newest], vec![]).unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("orders").unwrap().landing_path, "new_landing");
    }

    #[test]
    fn test_recently_created_row_supersedes_older_update() {
        let mut updated = stream_row(1, "orders");
        updated.landing_path = Some("stale_landing".to_string());
        updated.created_at = ts("2023-01-01 00:00:00");
        updated.updated_at = ts("2024-03-01 00:00:00");

        let mut replacement = stream_row(1, "orders");
        replacement.landing_path = Some("current_landing".to_string());
        replacement.created_at = ts("2025-01-01 00:00:00");
        replacement.updated_at = None;

        let catalog = Catalog::from_rows(vec![updated, replacement], vec![]).unwrap();
        assert_eq!(
            catalog.lookup("orders").unwrap().landing_path,
            "current_landing"
        );
    }

    #[test]
    fn test_creation_time_breaks_update_ties() {
        let mut first = stream_row(1, "orders");
        first.updated_at = ts("2024-03-01 00:00:00");
        first.created_at = ts("2024-01-01 00:00:00");
        first.channel_name = Some("first".to_string());

        let mut second = stream_row(1, "orders");
        second.updated_at = ts("2024-03-01 00:00:00");
        second.created_at = ts("2024-01-02 00:00:00");
        second.channel_name = Some("second".to_string());

        let catalog = Catalog::from_rows(vec![second, first], vec![]).unwrap();
        assert_eq!(catalog.lookup("orders").unwrap().channel_name, "second");
    }

    #[test]
    fn test_disabled_rows_ignored() {
        let mut disabled = stream_row(2, "users");
        disabled.enabled = false;

        let catalog = Catalog::from_rows(vec![stream_row(1, "orders"), disabled], vec![]).unwrap();
        assert!(catalog.lookup("users").is_none());
        assert_eq!(catalog.patterns().collect::<Vec<_>>(), vec!["orders"]);
    }

    #[test]
    fn test_expected_columns_are_lowercased_and_filtered() {
        let mut disabled = mapping(1, "legacy");
        disabled.enabled = false;
        let mut null = mapping(1, "x");
        null.source_column_name = None;

        let catalog = Catalog::from_rows(
            vec![stream_row(1, "orders")],
            vec![
                mapping(1, "ID"),
                mapping(1, " Total "),
                mapping(1, "id"),
                mapping(1, ""),
                disabled,
                null,
                mapping(99, "orphan"),
            ],
        )
        .unwrap();

        let expected: Vec<_> = catalog.expected_columns(1).iter().cloned().collect();
        assert_eq!(expected, vec!["id", "total"]);
        assert!(catalog.expected_columns(99).is_empty());
    }

    #[test]
    fn test_missing_required_field_is_invalid() {
        let mut row = stream_row(1, "orders");
        row.rejected_path = Some("  ".to_string());

        let err = Catalog::from_rows(vec![row], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));
        assert!(err.to_string().contains("rejected_path"));
    }

    #[test]
    fn test_shared_pattern_is_invalid() {
        let err = Catalog::from_rows(vec![stream_row(1, "orders"), stream_row(2, "orders")], vec![])
            .unwrap_err();
        assert!(err.to_string().contains("share file_name_pattern 'orders'"));
    }

    #[test]
    fn test_landing_paths_grouped() {
        let mut users = stream_row(2, "users");
        users.landing_path = Some("landing/".to_string());
        let mut events = stream_row(3, "events");
        events.landing_path = Some("other".to_string());

        let catalog =
            Catalog::from_rows(vec![events, users, stream_row(1, "orders")], vec![]).unwrap();

        assert_eq!(
            catalog.landing_paths(),
            vec![
                LandingPath {
                    path: "landing".to_string(),
                    patterns: vec!["orders".to_string(), "users".to_string()],
                },
                LandingPath {
                    path: "other".to_string(),
                    patterns: vec!["events".to_string()],
                },
            ]
        );
    }
}
