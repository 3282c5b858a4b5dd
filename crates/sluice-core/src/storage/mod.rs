//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for working with S3, GCS, Azure Blob Storage,
//! and local filesystem. Paths handed to and returned from the provider are
//! relative to the key prefix of the configured URL.

mod azure;
mod gcs;
mod local;
mod s3;
mod url_parser;

pub use url_parser::BackendConfig;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

// Re-export config types
pub use azure::AzureConfig;
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

/// Record the request counter and latency histogram for one storage call.
fn observe<T, E>(operation: StorageOperation, start: Instant, result: &Result<T, E>) {
    let status = if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Gcs(config) => Self::construct_gcs(config, options).await,
            BackendConfig::Azure(config) => Self::construct_azure(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config, options).await,
        }
    }

    /// The canonical URL of the storage root.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List the objects directly under `prefix` (one level, no recursion).
    ///
    /// Returns object paths relative to the configured base prefix. A prefix
    /// that does not exist lists as empty.
    pub async fn list_level(&self, prefix: &Path) -> Result<Vec<Path>, StorageError> {
        let qualified = self.qualify_path(prefix);
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let start = Instant::now();
        let result = self.object_store.list_with_delimiter(Some(&qualified)).await;
        observe(StorageOperation::List, start, &result);

        let listing = match result {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => {
                debug!("Prefix not found (listing as empty): {}", prefix);
                return Ok(Vec::new());
            }
            Err(source) => return Err(StorageError::ObjectStore { source }),
        };

        let mut paths: Vec<Path> = listing
            .objects
            .into_iter()
            .map(|meta| meta.location.parts().skip(key_part_count).collect())
            .collect();
        paths.sort();

        debug!(
            "Listed {} objects ({} sub-prefixes skipped) under {}",
            paths.len(),
            listing.common_prefixes.len(),
            prefix
        );

        Ok(paths)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let qualified = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.get(&qualified).await;
        observe(StorageOperation::Get, start, &result);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: &Path, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        let qualified = self.qualify_path(path);
        let payload = PutPayload::from(bytes.into());
        let start = Instant::now();
        let result = self.object_store.put(&qualified, payload).await;
        observe(StorageOperation::Put, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Server-side copy of one object to another key, overwriting the target.
    pub async fn copy(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(from);
        let to_qualified = self.qualify_path(to);
        let start = Instant::now();
        let result = self.object_store.copy(&from_qualified, &to_qualified).await;
        observe(StorageOperation::Copy, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete a file at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let qualified = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&qualified).await;
        observe(StorageOperation::Delete, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Check whether an object exists.
    pub async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let qualified = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.head(&qualified).await;
        observe(StorageOperation::Head, start, &result);

        match result {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_storage(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_level_is_not_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let landing = temp_dir.path().join("landing");
        std::fs::create_dir_all(landing.join("nested")).unwrap();
        std::fs::write(landing.join("orders-1.csv"), b"id\n1\n").unwrap();
        std::fs::write(landing.join("users-1.csv"), b"id\n1\n").unwrap();
        std::fs::write(landing.join("nested").join("orders-2.csv"), b"id\n").unwrap();

        let storage = local_storage(&temp_dir).await;
        let listed = storage.list_level(&Path::from("landing")).await.unwrap();

        let names: Vec<String> = listed.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["landing/orders-1.csv", "landing/users-1.csv"]);
    }

    #[tokio::test]
    async fn test_list_level_missing_prefix_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let listed = storage.list_level(&Path::from("nothing/here")).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_level_strips_base_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("bucket");
        std::fs::create_dir_all(base.join("landing")).unwrap();
        std::fs::write(base.join("landing").join("orders-1.csv"), b"id\n").unwrap();

        let storage = StorageProvider::for_url_with_options(
            &format!("{}/bucket", temp_dir.path().display()),
            HashMap::new(),
        )
        .await
        .unwrap();

        let listed = storage.list_level(&Path::from("landing")).await.unwrap();
        assert_eq!(listed, vec![Path::from("landing/orders-1.csv")]);
    }

    #[tokio::test]
    async fn test_copy_then_delete_moves_object() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let from = Path::from("landing/orders-1.csv");
        let to = Path::from("processing/orders-1.csv");
        storage.put(&from, b"id,total\n1,2\n".to_vec()).await.unwrap();

        storage.copy(&from, &to).await.unwrap();
        assert!(storage.exists(&from).await.unwrap());
        assert!(storage.exists(&to).await.unwrap());

        storage.delete(&from).await.unwrap();
        assert!(!storage.exists(&from).await.unwrap());
        assert_eq!(
            storage.get(&to).await.unwrap().as_ref(),
            b"id,total\n1,2\n".as_slice()
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let err = storage.get(&Path::from("missing.csv")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
