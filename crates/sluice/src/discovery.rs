//! Landing-prefix listing and pattern classification.
//!
//! A landing object belongs to a stream when the part of its file name
//! before the first `-` equals the stream's `file_name_pattern`:
//!
//! ```text
//! landing/orders-20240101.csv  ->  pattern "orders", extension "csv"
//! ```

use std::sync::Arc;

use object_store::path::Path;
use tracing::debug;

use crate::catalog::{Catalog, LandingPath};
use crate::error::StorageError;
use crate::metrics::events::FilesDiscovered;
use crate::model::{FileEvent, FileType};
use sluice_core::StorageProvider;
use sluice_core::emit;

/// Result of listing one landing prefix.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Objects directly under the prefix, matched or not.
    pub listed: usize,
    /// Matched objects, sorted by key.
    pub events: Vec<FileEvent>,
}

/// Split a file name into its pattern token and extension.
///
/// Either part is the whole name when its separator is absent.
pub fn parse_file_name(file_name: &str) -> (&str, &str) {
    let pattern = file_name
        .split_once('-')
        .map_or(file_name, |(pattern, _)| pattern);
    let extension = file_name
        .rsplit_once('.')
        .map_or(file_name, |(_, extension)| extension);
    (pattern, extension)
}

/// Lists landing prefixes and keeps the objects whose pattern is in the catalog.
pub struct FileDiscoverer {
    storage: Arc<StorageProvider>,
    job: String,
}

impl FileDiscoverer {
    pub fn new(storage: Arc<StorageProvider>, job: impl Into<String>) -> Self {
        Self {
            storage,
            job: job.into(),
        }
    }

    /// List `landing.path` (one level) and classify every object against the
    /// patterns of the streams landing there.
    pub async fn discover(
        &self,
        landing: &LandingPath,
        catalog: &Catalog,
    ) -> Result<Discovery, StorageError> {
        let prefix = Path::from(landing.path.trim_matches('/'));
        let listed = self.storage.list_level(&prefix).await?;

        let events: Vec<FileEvent> = listed
            .iter()
            .filter_map(|key| classify(key, &landing.patterns, catalog))
            .collect();

        debug!(
            target = %self.job,
            landing_path = %landing.path,
            listed = listed.len(),
            matched = events.len(),
            "Landing path listed"
        );

        emit!(FilesDiscovered {
            job: self.job.clone(),
            listed: listed.len() as u64,
            matched: events.len() as u64,
        });

        Ok(Discovery {
            listed: listed.len(),
            events,
        })
    }
}

fn classify(key: &Path, known_patterns: &[String], catalog: &Catalog) -> Option<FileEvent> {
    let file_name = key.filename()?;
    let (pattern, extension) = parse_file_name(file_name);
    if !known_patterns.iter().any(|known| known == pattern) {
        return None;
    }
    let stream = catalog.lookup(pattern)?;

    Some(FileEvent {
        key: key.clone(),
        file_name: file_name.to_string(),
        pattern: pattern.to_string(),
        extension: extension.to_string(),
        file_type: FileType::from_extension(extension),
        stream: Arc::clone(stream),
    })
}
