//! Azure Blob Storage backend.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;

use crate::error::{AzureConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// `abfss://container@account.dfs.core.windows.net[/key]` or
/// `https://account.blob.core.windows.net/container[/key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    pub(super) async fn construct_azure(
        config: AzureConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = MicrosoftAzureBuilder::from_env();
        for (key, value) in &options {
            let key: AzureConfigKey = key.parse().context(AzureConfigSnafu)?;
            builder = builder.with_config(key, value.clone());
        }

        // The URL wins over any account or container given as an option.
        let object_store: Arc<dyn ObjectStore> = Arc::new(
            builder
                .with_account(&config.account)
                .with_container_name(&config.container)
                .with_retry(RetryConfig::default())
                .build()
                .context(AzureConfigSnafu)?,
        );

        let canonical_url = match &config.key {
            Some(key) => format!(
                "https://{}.blob.core.windows.net/{}/{key}",
                config.account, config.container
            ),
            None => format!(
                "https://{}.blob.core.windows.net/{}",
                config.account, config.container
            ),
        };

        Ok(Self {
            config: BackendConfig::Azure(config),
            object_store,
            canonical_url,
        })
    }
}
