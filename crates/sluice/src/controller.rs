//! One validation run: catalog, discovery, then resolve / read / validate /
//! move / log for every matched file.
//!
//! Files are processed independently. A per-file failure is recorded in the
//! [`RunReport`] and never stops the run; only catalog and listing failures
//! are run-fatal.
//!
//! Ordering per file is move-then-log: the audit row describes where the
//! file physically is. A failed move is itself logged as `move_failed` so the
//! next run retries it.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use object_store::path::Path;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditLogger, AuditStore};
use crate::catalog::{Catalog, CatalogStore, load_catalog};
use crate::config::AlreadyProcessedPolicy;
use crate::discovery::FileDiscoverer;
use crate::error::{DiscoverySnafu, RunError};
use crate::history::{History, HistoryResolver};
use crate::metrics::events::{
    CatalogLoaded, FailureStage, FileFailed, FileRouted, RouteOutcome, RunDuration,
};
use crate::model::{BatchId, FileEvent, LoadStatus, LogEntry, StreamId, error_code};
use crate::notify::Severity;
use crate::reader::TableReader;
use crate::router::{Decision, Router, destination_key, destination_prefix};
use crate::validator::{ColumnSetValidator, SchemaValidator, Verdict};
use sluice_core::StorageProvider;
use sluice_core::emit;

/// Tunables of one controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub already_processed: AlreadyProcessedPolicy,
    pub max_concurrent_files: usize,
    pub text_delimiter: u8,
    /// Classify and validate only; nothing is moved or logged.
    pub dry_run: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            already_processed: AlreadyProcessedPolicy::default(),
            max_concurrent_files: 1,
            text_delimiter: b'\t',
            dry_run: false,
        }
    }
}

/// How many known patterns had files in landing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchWarning {
    /// Every pattern matched at least one file.
    #[default]
    None,
    /// Some patterns matched nothing.
    Partial,
    /// No pattern matched anything; the run ended early.
    NoFiles,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file was classified and (unless dry-running) moved and logged.
    Routed {
        decision: Decision,
        destination: Path,
        moved: bool,
    },
    /// Processing failed at `stage`.
    Errored {
        stage: FailureStage,
        message: String,
    },
}

/// Per-file entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file_name: String,
    pub stream_id: StreamId,
    /// Present when the columns were compared.
    pub verdict: Option<Verdict>,
    pub outcome: FileOutcome,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub batch_id: BatchId,
    /// Objects listed across all landing prefixes.
    pub listed: usize,
    /// Objects matched to a stream.
    pub matched: usize,
    pub validated_success: usize,
    pub validated_failed: usize,
    pub empty: usize,
    pub skipped_already_processed: usize,
    pub errored: usize,
    /// Matched files not started because shutdown was requested.
    pub not_started: usize,
    pub files: Vec<FileReport>,
    /// Known patterns with no file in landing, in catalog order.
    pub unmatched_patterns: Vec<String>,
    pub match_warning: MatchWarning,
}

impl RunReport {
    fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            listed: 0,
            matched: 0,
            validated_success: 0,
            validated_failed: 0,
            empty: 0,
            skipped_already_processed: 0,
            errored: 0,
            not_started: 0,
            files: Vec::new(),
            unmatched_patterns: Vec::new(),
            match_warning: MatchWarning::None,
        }
    }

    fn push(&mut self, file: FileReport) {
        match &file.outcome {
            FileOutcome::Routed { decision, .. } => match decision {
                Decision::Passed => self.validated_success += 1,
                Decision::Failed => self.validated_failed += 1,
                Decision::Empty => self.empty += 1,
                Decision::AlreadyProcessed => self.skipped_already_processed += 1,
            },
            FileOutcome::Errored { .. } => self.errored += 1,
        }
        self.files.push(file);
    }

    /// Warning when patterns went unmatched or files failed; success otherwise.
    pub fn severity(&self) -> Severity {
        if self.errored > 0 || self.not_started > 0 || self.match_warning != MatchWarning::None {
            Severity::Warning
        } else {
            Severity::Success
        }
    }

    /// Plain-text summary used as the notification body.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Batch: {}", self.batch_id);
        let _ = writeln!(out, "Files listed: {}, matched: {}", self.listed, self.matched);
        let _ = writeln!(
            out,
            "Validation success: {}, validation failed: {}, empty: {}, already processed: {}, errored: {}",
            self.validated_success,
            self.validated_failed,
            self.empty,
            self.skipped_already_processed,
            self.errored
        );
        if self.not_started > 0 {
            let _ = writeln!(out, "Not started (shutdown): {}", self.not_started);
        }

        match self.match_warning {
            MatchWarning::NoFiles => {
                let _ = writeln!(out, "No Files Found in S3 Landing Directory");
            }
            MatchWarning::Partial => {
                let _ = writeln!(
                    out,
                    "Any Files with below pattern are not found in S3 Landing Directory: {}",
                    self.unmatched_patterns.join(",")
                );
            }
            MatchWarning::None => {}
        }

        for file in &self.files {
            match &file.outcome {
                FileOutcome::Routed {
                    decision,
                    destination,
                    moved,
                } => {
                    let verb = if *moved { "moved to" } else { "would move to" };
                    let _ = writeln!(out, "  {}: {decision:?}, {verb} {destination}", file.file_name);
                }
                FileOutcome::Errored { stage, message } => {
                    let _ = writeln!(
                        out,
                        "  {}: error during {}: {message}",
                        file.file_name,
                        stage.as_str()
                    );
                }
            }
        }
        out
    }
}

/// Orchestrates one run over every stream of the catalog.
pub struct RunController {
    job: String,
    catalog_store: Arc<dyn CatalogStore>,
    discoverer: FileDiscoverer,
    history: HistoryResolver,
    reader: TableReader,
    validator: Arc<dyn SchemaValidator>,
    router: Router,
    audit: AuditLogger,
    options: ControllerOptions,
    shutdown: CancellationToken,
}

impl RunController {
    pub fn new(
        job: impl Into<String>,
        storage: Arc<StorageProvider>,
        catalog_store: Arc<dyn CatalogStore>,
        audit_store: Arc<dyn AuditStore>,
        options: ControllerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let job = job.into();
        Self {
            discoverer: FileDiscoverer::new(storage.clone(), job.clone()),
            history: HistoryResolver::new(audit_store.clone()),
            reader: TableReader::new(storage.clone(), options.text_delimiter),
            validator: Arc::new(ColumnSetValidator),
            router: Router::new(storage),
            audit: AuditLogger::new(audit_store, job.clone()),
            catalog_store,
            options,
            shutdown,
            job,
        }
    }

    /// Replace the default case-insensitive column-set validator.
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Run once with a batch id taken from the current local time.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.run_batch(BatchId::now()).await
    }

    /// Run once, tagging every audit row with `batch_id`.
    pub async fn run_batch(&self, batch_id: BatchId) -> Result<RunReport, RunError> {
        let start = Instant::now();
        let result = self.execute(batch_id).await;
        emit!(RunDuration {
            job: self.job.clone(),
            duration: start.elapsed(),
        });
        result
    }

    async fn execute(&self, batch_id: BatchId) -> Result<RunReport, RunError> {
        let mut report = RunReport::new(batch_id);

        let catalog = load_catalog(self.catalog_store.as_ref()).await?;
        emit!(CatalogLoaded {
            job: self.job.clone(),
            streams: catalog.len(),
        });
        info!(
            target = %self.job,
            streams = catalog.len(),
            batch_id = %report.batch_id,
            "Catalog loaded"
        );

        let mut events: Vec<FileEvent> = Vec::new();
        for landing in catalog.landing_paths() {
            let discovery = self
                .discoverer
                .discover(&landing, &catalog)
                .await
                .context(DiscoverySnafu {
                    landing_path: landing.path.clone(),
                })?;
            report.listed += discovery.listed;
            events.extend(discovery.events);
        }
        report.matched = events.len();

        let matched_patterns: HashSet<&str> = events.iter().map(|e| e.pattern.as_str()).collect();
        report.unmatched_patterns = catalog
            .patterns()
            .filter(|pattern| !matched_patterns.contains(pattern))
            .map(str::to_string)
            .collect();

        if events.is_empty() {
            report.match_warning = MatchWarning::NoFiles;
            warn!(
                target = %self.job,
                listed = report.listed,
                "No Files Found in S3 Landing Directory"
            );
            return Ok(report);
        }

        let files: Vec<FileReport> = futures::stream::iter(events)
            .take_until(self.shutdown.cancelled())
            .map(|event| self.process_file(event, &catalog, &report.batch_id))
            .buffer_unordered(self.options.max_concurrent_files.max(1))
            .collect()
            .await;

        report.not_started = report.matched - files.len();
        if report.not_started > 0 {
            warn!(
                target = %self.job,
                not_started = report.not_started,
                "Shutdown requested; remaining files left in landing"
            );
        }

        let mut files = files;
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        for file in files {
            report.push(file);
        }

        if !report.unmatched_patterns.is_empty() {
            report.match_warning = MatchWarning::Partial;
            warn!(
                target = %self.job,
                patterns = %report.unmatched_patterns.join(","),
                "Any Files with below pattern are not found in S3 Landing Directory"
            );
        }

        info!(
            target = %self.job,
            validated_success = report.validated_success,
            validated_failed = report.validated_failed,
            empty = report.empty,
            skipped = report.skipped_already_processed,
            errored = report.errored,
            "Run complete"
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        event: FileEvent,
        catalog: &Catalog,
        batch_id: &BatchId,
    ) -> FileReport {
        let stream = Arc::clone(&event.stream);
        let mut file = FileReport {
            file_name: event.file_name.clone(),
            stream_id: stream.stream_id,
            verdict: None,
            outcome: FileOutcome::Errored {
                stage: FailureStage::History,
                message: String::new(),
            },
        };

        let history = match self
            .history
            .resolve(stream.stream_id, &event.file_name)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                file.outcome = self.fail(&event, FailureStage::History, e.to_string());
                return file;
            }
        };

        let mut entry = LogEntry {
            stream_id: stream.stream_id,
            file_name: event.file_name.clone(),
            load_status: LoadStatus::ValidationSuccess,
            error_code: None,
            error_description: None,
            batch_id: batch_id.clone(),
            channel_name: stream.channel_name.clone(),
            source_row_count: None,
        };

        let decision = if let Some(prior) = history.prior.as_ref().filter(|_| !history.must_validate)
        {
            debug!(
                target = %self.job,
                file = %event.file_name,
                status = %prior.load_status,
                "File already processed; skipping validation"
            );
            entry.load_status = prior.load_status.clone();
            entry.source_row_count = prior.source_row_count;
            entry.error_code = Some(error_code::ALREADY_PROCESSED.to_string());
            entry.error_description = Some(format!(
                "{} was already processed with status {}",
                event.file_name, prior.load_status
            ));
            Decision::AlreadyProcessed
        } else {
            let shape = match self.reader.read(&event).await {
                Ok(shape) => shape,
                Err(e) => {
                    let message = e.to_string();
                    entry.load_status = LoadStatus::ReadFailed;
                    entry.error_code = Some(error_code::READ_FAILED.to_string());
                    entry.error_description = Some(message.clone());
                    file.outcome = self
                        .fail_and_log(&event, &entry, &history, FailureStage::Read, message)
                        .await;
                    return file;
                }
            };
            entry.source_row_count = i64::try_from(shape.row_count).ok();

            if shape.is_empty() {
                entry.load_status = LoadStatus::EmptyFile;
                Decision::Empty
            } else {
                let verdict = self
                    .validator
                    .validate(&shape.columns, catalog.expected_columns(stream.stream_id));
                let decision = match verdict.describe(&event.file_name) {
                    None => Decision::Passed,
                    Some((code, description)) => {
                        entry.load_status = LoadStatus::ValidationFailed;
                        entry.error_code = Some(code.to_string());
                        entry.error_description = Some(description);
                        Decision::Failed
                    }
                };
                file.verdict = Some(verdict);
                decision
            }
        };

        let outcome = decision.outcome(self.options.already_processed);
        let destination = destination_key(destination_prefix(&stream, outcome), &event.key);

        if self.options.dry_run {
            info!(
                target = %self.job,
                file = %event.file_name,
                status = %entry.load_status,
                destination = %destination,
                "Dry run: file classified"
            );
            emit!(FileRouted {
                job: self.job.clone(),
                stream: stream.stream_name.clone(),
                outcome: RouteOutcome::Unmoved,
            });
            file.outcome = FileOutcome::Routed {
                decision,
                destination,
                moved: false,
            };
            return file;
        }

        if let Err(e) = self.router.move_file(&event.key, &destination).await {
            let message = e.to_string();
            // A terminal status survives a failed move so the file is never
            // validated (and ingested) twice.
            if decision != Decision::AlreadyProcessed {
                entry.load_status = LoadStatus::MoveFailed;
            }
            entry.error_code = Some(error_code::MOVE_FAILED.to_string());
            entry.error_description = Some(message.clone());
            file.outcome = self
                .fail_and_log(&event, &entry, &history, FailureStage::Move, message)
                .await;
            return file;
        }

        if let Err(e) = self.audit.record(&entry, history.mode()).await {
            file.outcome = self.fail(
                &event,
                FailureStage::Audit,
                format!("moved to {destination} but audit write failed: {e}"),
            );
            return file;
        }

        info!(
            target = %self.job,
            stream_id = stream.stream_id,
            file = %event.file_name,
            status = %entry.load_status,
            destination = %destination,
            "File routed"
        );
        emit!(FileRouted {
            job: self.job.clone(),
            stream: stream.stream_name.clone(),
            outcome,
        });

        file.outcome = FileOutcome::Routed {
            decision,
            destination,
            moved: true,
        };
        file
    }

    /// Record a failure that leaves the file where it is, logging `entry`
    /// unless dry-running.
    async fn fail_and_log(
        &self,
        event: &FileEvent,
        entry: &LogEntry,
        history: &History,
        stage: FailureStage,
        message: String,
    ) -> FileOutcome {
        if self.options.dry_run {
            return self.fail(event, stage, message);
        }
        match self.audit.record(entry, history.mode()).await {
            Ok(()) => self.fail(event, stage, message),
            Err(e) => self.fail(event, stage, format!("{message}; audit write failed: {e}")),
        }
    }

    fn fail(&self, event: &FileEvent, stage: FailureStage, message: String) -> FileOutcome {
        error!(
            target = %self.job,
            stream_id = event.stream.stream_id,
            file = %event.file_name,
            stage = stage.as_str(),
            error = %message,
            "File processing failed"
        );
        emit!(FileFailed {
            job: self.job.clone(),
            stage,
        });
        FileOutcome::Errored { stage, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routed(name: &str, decision: Decision) -> FileReport {
        FileReport {
            file_name: name.to_string(),
            stream_id: 1,
            verdict: None,
            outcome: FileOutcome::Routed {
                decision,
                destination: Path::from(format!("somewhere/{name}")),
                moved: true,
            },
        }
    }

    #[test]
    fn test_report_counts_by_decision() {
        let mut report = RunReport::new(BatchId::from_stored("202401010000"));
        report.push(routed("a-1.csv", Decision::Passed));
        report.push(routed("b-1.csv", Decision::Failed));
        report.push(routed("c-1.csv", Decision::Empty));
        report.push(routed("d-1.csv", Decision::AlreadyProcessed));
        report.push(FileReport {
            file_name: "e-1.avro".to_string(),
            stream_id: 5,
            verdict: None,
            outcome: FileOutcome::Errored {
                stage: FailureStage::Read,
                message: "Unsupported file type 'avro'".to_string(),
            },
        });

        assert_eq!(report.validated_success, 1);
        assert_eq!(report.validated_failed, 1);
        assert_eq!(report.empty, 1);
        assert_eq!(report.skipped_already_processed, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(report.severity(), Severity::Warning);

        let summary = report.summary();
        assert!(summary.contains("Batch: 202401010000"));
        assert!(summary.contains("e-1.avro: error during read"));
    }

    #[test]
    fn test_clean_run_is_success() {
        let mut report = RunReport::new(BatchId::from_stored("202401010000"));
        report.push(routed("a-1.csv", Decision::Passed));
        report.push(routed("b-1.csv", Decision::Failed));
        assert_eq!(report.severity(), Severity::Success);

        report.match_warning = MatchWarning::Partial;
        report.unmatched_patterns = vec!["users".to_string()];
        assert_eq!(report.severity(), Severity::Warning);
        assert!(report.summary().contains("not found in S3 Landing Directory: users"));
    }
}
