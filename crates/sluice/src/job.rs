//! A configured validation job: open storage and stores, run the
//! controller once and send the run notification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::ResultExt;
use tracing::{debug, error, info};

use crate::audit::{AuditStore, PostgresAuditStore, SqliteAuditStore};
use crate::catalog::{CatalogStore, PostgresCatalogStore, SqliteCatalogStore};
use crate::config::{JobConfig, JobKey, StoreBackend};
use crate::controller::{ControllerOptions, RunController, RunReport};
use crate::error::{JobError, StoreOpenSnafu};
use crate::notify::{
    CommandNotifier, LogNotifier, Notification, Notifier, Severity, log_attachment, send,
};
use sluice_core::{Job, JobContext, StorageProvider};

/// One job per `jobs:` entry.
pub struct ValidationJob {
    key: JobKey,
    config: JobConfig,
    context: JobContext,
    log_file: Option<PathBuf>,
}

impl ValidationJob {
    pub fn new(
        key: JobKey,
        config: JobConfig,
        context: JobContext,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            key,
            config,
            context,
            log_file,
        }
    }

    async fn open_catalog(&self) -> Result<Arc<dyn CatalogStore>, JobError> {
        let catalog = &self.config.catalog;
        let store: Arc<dyn CatalogStore> = match catalog.backend {
            StoreBackend::Sqlite => Arc::new(
                SqliteCatalogStore::open(Path::new(&catalog.url), catalog.tables())
                    .context(StoreOpenSnafu { store: "catalog" })?,
            ),
            StoreBackend::Postgres => Arc::new(
                PostgresCatalogStore::connect(&catalog.url, catalog.tables())
                    .await
                    .context(StoreOpenSnafu { store: "catalog" })?,
            ),
        };
        Ok(store)
    }

    async fn open_audit(&self) -> Result<Arc<dyn AuditStore>, JobError> {
        let audit = &self.config.audit;
        let store: Arc<dyn AuditStore> = match audit.backend {
            StoreBackend::Sqlite => Arc::new(
                SqliteAuditStore::open(Path::new(&audit.url), audit.log_table.clone())
                    .context(StoreOpenSnafu { store: "audit" })?,
            ),
            StoreBackend::Postgres => Arc::new(
                PostgresAuditStore::connect(&audit.url, audit.log_table.clone())
                    .await
                    .context(StoreOpenSnafu { store: "audit" })?,
            ),
        };
        Ok(store)
    }

    fn options(&self) -> ControllerOptions {
        ControllerOptions {
            already_processed: self.config.routing.already_processed,
            max_concurrent_files: self.config.routing.max_concurrent_files,
            // Validated as ASCII at config load.
            text_delimiter: self.config.files.text_delimiter as u8,
            dry_run: self.context.dry_run,
        }
    }

    async fn execute(&self) -> Result<RunReport, JobError> {
        let storage = StorageProvider::for_url_with_options(
            &self.config.storage.url,
            self.config.storage.options.clone(),
        )
        .await?;
        debug!(
            target = %self.key,
            backend = storage.config().scheme(),
            root = storage.canonical_url(),
            "Storage ready"
        );
        let catalog_store = self.open_catalog().await?;
        let audit_store = self.open_audit().await?;

        let controller = RunController::new(
            self.key.id(),
            Arc::new(storage),
            catalog_store,
            audit_store,
            self.options(),
            self.context.shutdown.clone(),
        );

        Ok(controller.run().await?)
    }

    fn notifier(&self) -> Box<dyn Notifier> {
        match &self.config.notification.command {
            Some(command) if !self.context.dry_run => Box::new(CommandNotifier::new(
                command.clone(),
                self.config.notification.recipients.clone(),
            )),
            _ => Box::new(LogNotifier),
        }
    }

    async fn notify(&self, result: &Result<RunReport, JobError>) {
        let (severity, mut body) = match result {
            Ok(report) => (report.severity(), report.summary()),
            Err(e) => (Severity::Fatal, format!("Validation failed: {e}\n")),
        };

        let max_bytes = self.config.notification.attach_log_max_bytes;
        let attachment = log_attachment(self.log_file.as_deref(), max_bytes).await;
        if let (Some(log_file), None) = (&self.log_file, &attachment) {
            body.push_str(&format!(
                "Log file not attached (missing or larger than {max_bytes} bytes): {}\n",
                log_file.display()
            ));
        }

        let notification = Notification::new(
            &self.config.source,
            &self.config.environment,
            severity,
            body,
        )
        .with_attachment(attachment);
        send(self.notifier().as_ref(), &notification).await;
    }
}

impl Job for ValidationJob {
    type Key = JobKey;
    type Error = JobError;

    fn key(&self) -> &JobKey {
        &self.key
    }

    async fn run(self) -> Result<(), JobError> {
        info!(
            target = %self.key,
            source = %self.config.source,
            environment = %self.config.environment,
            "Validation run starting"
        );

        let result = self.execute().await;
        if let Err(e) = &result {
            error!(target = %self.key, error = %e, "Validation run failed");
        }
        self.notify(&result).await;

        result.map(|_| ())
    }
}
