//! Catalog store seam.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{FieldMappingRow, StreamRow};

/// Names of the tables holding stream definitions and field mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTables {
    pub stream_table: String,
    pub field_mapping_table: String,
}

/// Read access to the raw catalog rows.
///
/// Implementations may pre-filter disabled rows; dedup and validation
/// happen in [`crate::catalog::Catalog::from_rows`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_stream_rows(&self) -> Result<Vec<StreamRow>, DatabaseError>;

    async fn fetch_field_mapping_rows(&self) -> Result<Vec<FieldMappingRow>, DatabaseError>;
}
