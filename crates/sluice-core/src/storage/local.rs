//! Local filesystem backend, for tests and mounted landing areas.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use snafu::prelude::*;
use tracing::warn;

use crate::error::{IoSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// A directory root; created if missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    pub(super) async fn construct_local(
        config: LocalConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        if !options.is_empty() {
            warn!(
                path = %config.path,
                options = options.len(),
                "Storage options are ignored for local paths"
            );
        }

        tokio::fs::create_dir_all(&config.path)
            .await
            .context(IoSnafu)?;
        let root = LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?;

        Ok(Self {
            canonical_url: format!("file://{}", config.path),
            config: BackendConfig::Local(config),
            object_store: Arc::new(root) as Arc<dyn ObjectStore>,
        })
    }
}
