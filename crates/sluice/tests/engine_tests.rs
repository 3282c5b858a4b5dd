//! End-to-end runs of the controller against local storage and in-memory
//! SQLite catalog and audit stores.
//!
//! Run with: cargo test -p sluice --test engine_tests

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use object_store::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sluice::audit::{AuditStore, SqliteAuditStore};
use sluice::catalog::{CatalogTables, SqliteCatalogStore};
use sluice::config::AlreadyProcessedPolicy;
use sluice::controller::{ControllerOptions, FileOutcome, MatchWarning, RunController};
use sluice::metrics::events::FailureStage;
use sluice::model::{BatchId, FieldMappingRow, LoadStatus, LogEntry, StreamRow, error_code};
use sluice::notify::Severity;
use sluice::router::Decision;
use sluice::validator::{ColumnSetValidator, SchemaValidator, Verdict};
use sluice::{RunReport, StorageProvider};

const BATCH: &str = "202401011200";

struct Harness {
    dir: TempDir,
    storage: Arc<StorageProvider>,
    catalog: Arc<SqliteCatalogStore>,
    audit: Arc<SqliteAuditStore>,
}

fn stream(stream_id: i64, pattern: &str) -> StreamRow {
    StreamRow {
        stream_id,
        stream_name: Some(format!("{pattern}_stream")),
        file_name_pattern: Some(pattern.to_string()),
        landing_path: Some("landing/".to_string()),
        processing_path: Some(format!("processing/{pattern}")),
        rejected_path: Some(format!("rejected/{pattern}")),
        archive_path: Some(format!("archive/{pattern}")),
        channel_name: Some("saas".to_string()),
        enabled: true,
        created_at: None,
        updated_at: None,
    }
}

fn column(stream_id: i64, name: &str) -> FieldMappingRow {
    FieldMappingRow {
        stream_id,
        source_column_name: Some(name.to_string()),
        enabled: true,
        created_at: None,
        updated_at: None,
    }
}

impl Harness {
    /// Streams `orders` (id, total) and `users` (user_id, name), both landing
    /// under `landing/`.
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url_with_options(
            dir.path().to_str().unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();

        let catalog = SqliteCatalogStore::in_memory(CatalogTables {
            stream_table: "stream_control".to_string(),
            field_mapping_table: "field_mapping".to_string(),
        })
        .unwrap();
        catalog.insert_stream_row(&stream(1, "orders")).unwrap();
        catalog.insert_stream_row(&stream(2, "users")).unwrap();
        for (stream_id, name) in [(1, "id"), (1, "Total"), (2, "user_id"), (2, "name")] {
            catalog
                .insert_field_mapping_row(&column(stream_id, name))
                .unwrap();
        }

        Self {
            dir,
            storage: Arc::new(storage),
            catalog: Arc::new(catalog),
            audit: Arc::new(SqliteAuditStore::in_memory("ingestion_log").unwrap()),
        }
    }

    async fn land(&self, file_name: &str, contents: &str) {
        self.storage
            .put(
                &Path::from(format!("landing/{file_name}")),
                contents.as_bytes().to_vec(),
            )
            .await
            .unwrap();
    }

    async fn land_bytes(&self, file_name: &str, contents: Vec<u8>) {
        self.storage
            .put(&Path::from(format!("landing/{file_name}")), contents)
            .await
            .unwrap();
    }

    async fn exists(&self, key: &str) -> bool {
        self.storage.exists(&Path::from(key)).await.unwrap()
    }

    async fn prior(&self, stream_id: i64, file_name: &str, status: LoadStatus) {
        self.audit
            .insert(&LogEntry {
                stream_id,
                file_name: file_name.to_string(),
                load_status: status,
                error_code: None,
                error_description: None,
                batch_id: BatchId::from_stored("202312310000"),
                channel_name: "saas".to_string(),
                source_row_count: Some(1),
            })
            .await
            .unwrap();
    }

    async fn latest(&self, stream_id: i64, file_name: &str) -> Option<LogEntry> {
        self.audit.latest(stream_id, file_name).await.unwrap()
    }

    fn controller(&self, options: ControllerOptions, shutdown: CancellationToken) -> RunController {
        RunController::new(
            "test",
            self.storage.clone(),
            self.catalog.clone(),
            self.audit.clone(),
            options,
            shutdown,
        )
    }

    async fn run(&self, options: ControllerOptions) -> RunReport {
        self.controller(options, CancellationToken::new())
            .run_batch(BatchId::from_stored(BATCH))
            .await
            .unwrap()
    }
}

/// Delegates to the column-set validator and counts calls.
#[derive(Default)]
struct CountingValidator {
    calls: AtomicUsize,
}

impl SchemaValidator for CountingValidator {
    fn validate(&self, columns: &[String], expected: &BTreeSet<String>) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ColumnSetValidator.validate(columns, expected)
    }
}

#[tokio::test]
async fn test_files_are_routed_by_verdict() {
    let h = Harness::new().await;
    h.land("orders-1.csv", "ID,total\n1,10\n2,20\n").await;
    h.land("orders-2.csv", "ID,Total,Extra\n1,2,3\n").await;
    h.land("users-1.csv", "user_id,name\n").await;

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.listed, 3);
    assert_eq!(report.matched, 3);
    assert_eq!(report.validated_success, 1);
    assert_eq!(report.validated_failed, 1);
    assert_eq!(report.empty, 1);
    assert_eq!(report.errored, 0);
    assert_eq!(report.match_warning, MatchWarning::None);
    assert_eq!(report.severity(), Severity::Success);

    assert!(h.exists("processing/orders/orders-1.csv").await);
    assert!(h.exists("rejected/orders/orders-2.csv").await);
    assert!(h.exists("archive/users/users-1.csv").await);
    assert!(!h.exists("landing/orders-1.csv").await);
    assert!(!h.exists("landing/orders-2.csv").await);
    assert!(!h.exists("landing/users-1.csv").await);

    let passed = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(passed.load_status, LoadStatus::ValidationSuccess);
    assert_eq!(passed.source_row_count, Some(2));
    assert_eq!(passed.batch_id.as_str(), BATCH);
    assert_eq!(passed.channel_name, "saas");

    let failed = h.latest(1, "orders-2.csv").await.unwrap();
    assert_eq!(failed.load_status, LoadStatus::ValidationFailed);
    assert_eq!(
        failed.error_code.as_deref(),
        Some(error_code::UNEXPECTED_COLUMNS)
    );
    assert_eq!(
        failed.error_description.as_deref(),
        Some(
            "New Columns - extra are found in orders-2.csv which are not present in Column Mapping Metadata Table"
        )
    );

    let verdict = report
        .files
        .iter()
        .find(|f| f.file_name == "orders-2.csv")
        .and_then(|f| f.verdict.clone())
        .unwrap();
    assert!(verdict.missing_in_file.is_empty());
    assert_eq!(
        verdict.unexpected_in_file,
        BTreeSet::from(["extra".to_string()])
    );

    let empty = h.latest(2, "users-1.csv").await.unwrap();
    assert_eq!(empty.load_status, LoadStatus::EmptyFile);
    assert_eq!(empty.source_row_count, Some(0));
}

#[tokio::test]
async fn test_terminal_prior_skips_validation() {
    let h = Harness::new().await;
    h.prior(1, "orders-1.csv", LoadStatus::ValidationSuccess).await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;

    let validator = Arc::new(CountingValidator::default());
    let report = h
        .controller(ControllerOptions::default(), CancellationToken::new())
        .with_validator(validator.clone())
        .run_batch(BatchId::from_stored(BATCH))
        .await
        .unwrap();

    assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.skipped_already_processed, 1);
    assert!(h.exists("rejected/orders/orders-1.csv").await);
    assert!(!h.exists("landing/orders-1.csv").await);

    assert_eq!(h.audit.row_count(1, "orders-1.csv").await.unwrap(), 1);
    let entry = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::ValidationSuccess);
    assert_eq!(
        entry.error_code.as_deref(),
        Some(error_code::ALREADY_PROCESSED)
    );
    assert_eq!(entry.batch_id.as_str(), BATCH);
}

#[tokio::test]
async fn test_archive_policy_for_already_processed() {
    let h = Harness::new().await;
    h.prior(1, "orders-1.csv", LoadStatus::IngestionSuccess).await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;

    let options = ControllerOptions {
        already_processed: AlreadyProcessedPolicy::Archive,
        ..ControllerOptions::default()
    };
    let report = h.run(options).await;

    assert_eq!(report.skipped_already_processed, 1);
    assert!(h.exists("archive/orders/orders-1.csv").await);
    let entry = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::IngestionSuccess);
}

#[tokio::test]
async fn test_failed_prior_is_revalidated_in_place() {
    let h = Harness::new().await;
    h.prior(1, "orders-1.csv", LoadStatus::ValidationFailed).await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;

    let validator = Arc::new(CountingValidator::default());
    let report = h
        .controller(ControllerOptions::default(), CancellationToken::new())
        .with_validator(validator.clone())
        .run_batch(BatchId::from_stored(BATCH))
        .await
        .unwrap();

    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.validated_success, 1);
    assert!(h.exists("processing/orders/orders-1.csv").await);

    // Updated, not appended.
    assert_eq!(h.audit.row_count(1, "orders-1.csv").await.unwrap(), 1);
    let entry = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::ValidationSuccess);
    assert!(entry.error_code.is_none());
}

#[tokio::test]
async fn test_empty_landing_reports_no_files() {
    let h = Harness::new().await;
    h.storage
        .put(&Path::from("elsewhere/orders-1.csv"), b"id,total\n1,2\n".to_vec())
        .await
        .unwrap();

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.listed, 0);
    assert_eq!(report.matched, 0);
    assert!(report.files.is_empty());
    assert_eq!(report.match_warning, MatchWarning::NoFiles);
    assert_eq!(report.severity(), Severity::Warning);
    assert_eq!(report.unmatched_patterns, vec!["orders", "users"]);
    assert!(report.summary().contains("No Files Found in S3 Landing Directory"));
}

#[tokio::test]
async fn test_partial_match_warns_with_missing_patterns() {
    let h = Harness::new().await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;
    h.land("invoices-1.csv", "id\n1\n").await;

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.listed, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.match_warning, MatchWarning::Partial);
    assert_eq!(report.unmatched_patterns, vec!["users"]);
    assert_eq!(report.severity(), Severity::Warning);
    // Unmatched objects are never touched.
    assert!(h.exists("landing/invoices-1.csv").await);
}

#[tokio::test]
async fn test_move_failure_leaves_file_in_landing() {
    let h = Harness::new().await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;
    // A regular file where the destination directory should be.
    std::fs::write(h.dir.path().join("processing"), b"not a directory").unwrap();

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.errored, 1);
    assert_eq!(report.validated_success, 0);
    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::Errored {
            stage: FailureStage::Move,
            ..
        }
    ));
    assert!(h.exists("landing/orders-1.csv").await);

    let entry = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::MoveFailed);
    assert_eq!(entry.error_code.as_deref(), Some(error_code::MOVE_FAILED));

    // Retried on the next run once the destination is usable.
    std::fs::remove_file(h.dir.path().join("processing")).unwrap();
    let report = h.run(ControllerOptions::default()).await;
    assert_eq!(report.validated_success, 1);
    assert!(h.exists("processing/orders/orders-1.csv").await);
    assert_eq!(h.audit.row_count(1, "orders-1.csv").await.unwrap(), 1);
}

#[tokio::test]
async fn test_rerun_against_rejected_file_is_stable() {
    let h = Harness::new().await;
    h.prior(1, "orders-1.csv", LoadStatus::ValidationSuccess).await;
    let validator = Arc::new(CountingValidator::default());

    for _ in 0..2 {
        h.land("orders-1.csv", "id,total\n1,10\n").await;
        let report = h
            .controller(ControllerOptions::default(), CancellationToken::new())
            .with_validator(validator.clone())
            .run_batch(BatchId::from_stored(BATCH))
            .await
            .unwrap();

        assert_eq!(report.skipped_already_processed, 1);
        match &report.files[0].outcome {
            FileOutcome::Routed { destination, .. } => {
                assert_eq!(destination, &Path::from("rejected/orders/orders-1.csv"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(h.exists("rejected/orders/orders-1.csv").await);
        assert!(!h.exists("landing/orders-1.csv").await);
        assert_eq!(h.audit.row_count(1, "orders-1.csv").await.unwrap(), 1);
    }

    assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    let entry = h.latest(1, "orders-1.csv").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::ValidationSuccess);
}

fn workbook(rows: &[&[&str]]) -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            sheet.write_string(r as u32, c as u16, *value).unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn test_excel_files_are_validated_and_routed() {
    let h = Harness::new().await;
    h.land_bytes(
        "orders-1.xlsx",
        workbook(&[&["ID", "Total"], &["1", "10"], &["2", "20"]]),
    )
    .await;
    h.land_bytes("users-1.xlsx", workbook(&[&["user_id", "email"], &["7", "a@b"]]))
        .await;

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.errored, 0);
    assert_eq!(report.validated_success, 1);
    assert_eq!(report.validated_failed, 1);
    assert!(h.exists("processing/orders/orders-1.xlsx").await);
    assert!(h.exists("rejected/users/users-1.xlsx").await);

    let passed = h.latest(1, "orders-1.xlsx").await.unwrap();
    assert_eq!(passed.load_status, LoadStatus::ValidationSuccess);
    assert_eq!(passed.source_row_count, Some(2));

    let failed = h.latest(2, "users-1.xlsx").await.unwrap();
    assert_eq!(
        failed.error_code.as_deref(),
        Some(error_code::MISSING_AND_UNEXPECTED)
    );
}

#[tokio::test]
async fn test_unreadable_file_stays_in_landing() {
    let h = Harness::new().await;
    // Not a zip archive, so the workbook cannot be opened.
    h.land("orders-1.xlsx", "not really a workbook").await;
    h.land("users-1.csv", "user_id,name\n7,ana\n").await;

    let report = h.run(ControllerOptions::default()).await;

    assert_eq!(report.errored, 1);
    assert_eq!(report.validated_success, 1);
    assert!(h.exists("landing/orders-1.xlsx").await);
    assert!(h.exists("processing/users/users-1.csv").await);

    let entry = h.latest(1, "orders-1.xlsx").await.unwrap();
    assert_eq!(entry.load_status, LoadStatus::ReadFailed);
    assert_eq!(entry.error_code.as_deref(), Some(error_code::READ_FAILED));
}

#[tokio::test]
async fn test_cancelled_run_starts_no_file() {
    let h = Harness::new().await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;
    h.land("users-1.csv", "user_id,name\n7,ana\n").await;

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let report = h
        .controller(ControllerOptions::default(), shutdown)
        .run_batch(BatchId::from_stored(BATCH))
        .await
        .unwrap();

    assert_eq!(report.matched, 2);
    assert_eq!(report.not_started, 2);
    assert!(report.files.is_empty());
    assert_eq!(report.severity(), Severity::Warning);
    assert!(h.exists("landing/orders-1.csv").await);
    assert!(h.latest(1, "orders-1.csv").await.is_none());
}

#[tokio::test]
async fn test_dry_run_moves_and_logs_nothing() {
    let h = Harness::new().await;
    h.land("orders-1.csv", "id,total\n1,10\n").await;
    h.land("orders-2.csv", "id\n1\n").await;

    let options = ControllerOptions {
        dry_run: true,
        max_concurrent_files: 4,
        ..ControllerOptions::default()
    };
    let report = h.run(options).await;

    assert_eq!(report.validated_success, 1);
    assert_eq!(report.validated_failed, 1);
    for file in &report.files {
        assert!(matches!(file.outcome, FileOutcome::Routed { moved: false, .. }));
    }
    match &report.files[0].outcome {
        FileOutcome::Routed {
            decision,
            destination,
            ..
        } => {
            assert_eq!(*decision, Decision::Passed);
            assert_eq!(destination, &Path::from("processing/orders/orders-1.csv"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert!(h.exists("landing/orders-1.csv").await);
    assert!(h.exists("landing/orders-2.csv").await);
    assert!(h.latest(1, "orders-1.csv").await.is_none());
    assert!(h.latest(1, "orders-2.csv").await.is_none());
}

#[tokio::test]
async fn test_text_files_use_configured_delimiter() {
    let h = Harness::new().await;
    h.land("users-1.txt", "user_id|name\n7|ana\n").await;

    let options = ControllerOptions {
        text_delimiter: b'|',
        ..ControllerOptions::default()
    };
    let report = h.run(options).await;

    assert_eq!(report.validated_success, 1);
    assert!(h.exists("processing/users/users-1.txt").await);
}
