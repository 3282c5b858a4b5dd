//! Google Cloud Storage backend.
//!
//! Credentials come from the environment (`GOOGLE_APPLICATION_CREDENTIALS`,
//! `GOOGLE_SERVICE_ACCOUNT_KEY`) unless given in `storage.options`.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::gcp::{GoogleCloudStorageBuilder, GoogleConfigKey};
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{GcsConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// `gs://bucket[/key]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    pub(super) async fn construct_gcs(
        config: GcsConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = GoogleCloudStorageBuilder::from_env();
        if let Ok(service_account_key) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            debug!("Using service account key from environment");
            builder = builder.with_service_account_key(&service_account_key);
        }
        for (key, value) in &options {
            let key: GoogleConfigKey = key.parse().context(GcsConfigSnafu)?;
            builder = builder.with_config(key, value.clone());
        }

        let object_store: Arc<dyn ObjectStore> = Arc::new(
            builder
                .with_bucket_name(&config.bucket)
                .with_retry(RetryConfig::default())
                .build()
                .context(GcsConfigSnafu)?,
        );

        let canonical_url = match &config.key {
            Some(key) => format!("https://{}.storage.googleapis.com/{key}", config.bucket),
            None => format!("https://{}.storage.googleapis.com", config.bucket),
        };

        Ok(Self {
            config: BackendConfig::Gcs(config),
            object_store,
            canonical_url,
        })
    }
}
