//! Sluice: metadata-driven validation and routing of landing files.
//!
//! This crate handles:
//! - Loading stream definitions and expected columns from a catalog database
//! - Discovering landing files and matching them to streams by name pattern
//! - Validating file headers against the catalog and routing each file to
//!   its processing, rejected or archive prefix
//! - Recording every outcome in an audit log and notifying on completion

pub mod audit;
pub mod catalog;
pub mod config;
pub mod controller;
mod db;
pub mod discovery;
pub mod error;
pub mod history;
pub mod job;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod reader;
pub mod router;
pub mod validator;

// Re-export commonly used items
pub use catalog::{Catalog, CatalogStore, CatalogTables};
pub use config::Config;
pub use controller::{ControllerOptions, FileOutcome, MatchWarning, RunController, RunReport};
pub use error::{JobError, RunError};
pub use job::ValidationJob;
pub use validator::{ColumnSetValidator, SchemaValidator, Verdict};

// Re-export from sluice-core
pub use sluice_core::{Application, CliArgs, JobContext, StorageProvider, StorageProviderRef};
