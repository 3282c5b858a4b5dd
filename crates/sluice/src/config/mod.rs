//! Configuration for sluice validation jobs.

mod job_key;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

pub use job_key::JobKey;
pub use sluice_core::config::{
    CliArgs, ConfigPath, LoggingConfig, MB, Mergeable, MetricsConfig, interpolate, load_from_paths,
};

use crate::catalog::CatalogTables;
use crate::db::is_sql_identifier;
use crate::job::ValidationJob;
use sluice_core::error::ConfigError;
use sluice_core::{AppConfig, JobContext};

fn default_max_concurrent_files() -> usize {
    1
}

fn default_text_delimiter() -> char {
    '\t'
}

fn default_attach_log_max_bytes() -> u64 {
    MB
}

/// Object storage holding the landing, processing, rejected and archive
/// prefixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Bucket URL (`s3://`, `gs://`, `abfss://`, or a local directory).
    pub url: String,
    /// Extra `object_store` options (credentials, region, endpoint).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Database backend for the catalog and audit stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Postgres => "postgres",
        }
    }
}

/// Where the stream definitions and field mappings are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub backend: StoreBackend,
    /// File path for `sqlite`, connection string for `postgres`.
    pub url: String,
    pub stream_table: String,
    pub field_mapping_table: String,
}

impl CatalogConfig {
    pub fn tables(&self) -> CatalogTables {
        CatalogTables {
            stream_table: self.stream_table.clone(),
            field_mapping_table: self.field_mapping_table.clone(),
        }
    }
}

/// Where outcomes are logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub log_table: String,
}

/// Destination of files whose history already shows a terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlreadyProcessedPolicy {
    #[default]
    Rejected,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    #[serde(default)]
    pub already_processed: AlreadyProcessedPolicy,
    /// Files processed at once. 1 keeps processing strictly sequential.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            already_processed: AlreadyProcessedPolicy::default(),
            max_concurrent_files: default_max_concurrent_files(),
        }
    }
}

/// Reader options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Field separator of `.txt` files.
    #[serde(default = "default_text_delimiter")]
    pub text_delimiter: char,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            text_delimiter: default_text_delimiter(),
        }
    }
}

/// Run-level notification settings.
///
/// Without a `command`, notifications are only written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// `mailx`-compatible program.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// The log file is attached only when it is at most this large.
    #[serde(default = "default_attach_log_max_bytes")]
    pub attach_log_max_bytes: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            command: None,
            recipients: Vec::new(),
            attach_log_max_bytes: default_attach_log_max_bytes(),
        }
    }
}

/// One validation job: a source system in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Source system name, used in notification subjects.
    pub source: String,
    pub environment: String,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl JobConfig {
    fn validate(&self, job: &str) -> Result<(), ConfigError> {
        if self.storage.url.is_empty() {
            return Err(ConfigError::EmptyStorageUrl {
                job: job.to_string(),
            });
        }

        for (store, url) in [("catalog", &self.catalog.url), ("audit", &self.audit.url)] {
            if url.is_empty() {
                return Err(ConfigError::EmptyStoreUrl {
                    job: job.to_string(),
                    store: store.to_string(),
                });
            }
        }

        for (field, name) in [
            ("catalog.stream_table", &self.catalog.stream_table),
            ("catalog.field_mapping_table", &self.catalog.field_mapping_table),
            ("audit.log_table", &self.audit.log_table),
        ] {
            if !is_sql_identifier(name) {
                return Err(ConfigError::InvalidIdentifier {
                    job: job.to_string(),
                    field: field.to_string(),
                    name: name.clone(),
                });
            }
        }

        if self.routing.max_concurrent_files == 0 {
            return Err(ConfigError::ZeroConcurrency {
                job: job.to_string(),
            });
        }

        if !self.files.text_delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter {
                job: job.to_string(),
                delimiter: self.files.text_delimiter,
            });
        }

        Ok(())
    }
}

/// Main configuration for sluice.
///
/// # Example
///
/// ```yaml
/// jobs:
///   saas:
///     source: saas
///     environment: prod
///     storage:
///       url: s3://ingest-bucket
///     catalog:
///       backend: postgres
///       url: "host=warehouse dbname=fusion"
///       stream_table: fusion_metadata.saas_ingstn_stream_control
///       field_mapping_table: fusion_metadata.saas_ingstn_field_mapping
///     audit:
///       backend: postgres
///       url: "host=warehouse dbname=fusion"
///       log_table: fusion_log.saas_ingstn_log
///
/// logging:
///   file: /var/log/sluice/saas.log
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub jobs: IndexMap<JobKey, JobConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Mergeable for Config {
    type Key = JobKey;
    type Component = JobConfig;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component> {
        &mut self.jobs
    }

    fn metrics_mut(&mut self) -> &mut MetricsConfig {
        &mut self.metrics
    }

    fn logging_mut(&mut self) -> &mut LoggingConfig {
        &mut self.logging
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }
}

impl Config {
    /// Parse and validate configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config = Self::parse_yaml(&result.text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every job. All job errors are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }

        let mut errors: Vec<ConfigError> = self
            .jobs
            .iter()
            .filter_map(|(key, job)| job.validate(key.id()).err())
            .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = (&JobKey, &JobConfig)> {
        self.jobs.iter()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

impl AppConfig for Config {
    type Job = ValidationJob;

    fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config: Self = load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    fn create_jobs(&self, context: JobContext) -> Vec<ValidationJob> {
        self.jobs
            .iter()
            .map(|(key, job)| {
                ValidationJob::new(
                    key.clone(),
                    job.clone(),
                    context.clone(),
                    self.logging.file.clone(),
                )
            })
            .collect()
    }

    fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn log_startup_info(&self) {
        info!("Starting sluice with {} job(s)", self.job_count());
        for (key, job) in self.jobs() {
            info!(
                "  Job: {} (source={}, environment={}, storage={}, catalog={}, audit={})",
                key,
                job.source,
                job.environment,
                job.storage.url,
                job.catalog.backend.as_str(),
                job.audit.backend.as_str()
            );
        }
    }
}
