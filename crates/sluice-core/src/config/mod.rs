//! Configuration building blocks shared by every sluice job.
//!
//! Job-specific sections live in the `sluice` crate; this module owns file
//! discovery, environment interpolation, merging and the process-wide
//! `metrics` / `logging` sections.

mod component_key;
mod loader;
mod path;
mod vars;

pub use component_key::ComponentKey;
pub use loader::{Mergeable, load_from_paths};
pub use path::{CliArgs, ConfigPath, is_yaml_file};
pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Byte size constants (binary/IEC units).
pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;

/// Metrics configuration for the Prometheus endpoint.
///
/// When `address` is unset no exporter is installed and the `metrics`
/// facade calls are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP server (e.g. "0.0.0.0:9090").
    #[serde(default)]
    pub address: Option<String>,
}

impl MetricsConfig {
    /// Merge values from another MetricsConfig (last-write-wins).
    pub fn merge_from(&mut self, other: Self) {
        if other.address.is_some() {
            self.address = other.address;
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Additional plain-text log file. Also used as the notification
    /// attachment when it is small enough.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Merge values from another LoggingConfig (last-write-wins).
    pub fn merge_from(&mut self, other: Self) {
        if other.file.is_some() {
            self.file = other.file;
        }
    }
}
