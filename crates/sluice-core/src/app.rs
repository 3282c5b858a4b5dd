//! Application abstraction for reducing main.rs boilerplate.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::config::{CliArgs, ConfigPath, LoggingConfig, Mergeable, MetricsConfig};
use crate::error::ConfigError;
use crate::topology::{Job, JobContext, run_jobs};
use crate::tracing::init_tracing;

/// Trait for application configurations that can be loaded and run.
pub trait AppConfig: Mergeable + Sized {
    /// The job type this config produces.
    type Job: Job;

    /// Load config from paths with validation.
    fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError>;

    /// Create jobs from this config.
    fn create_jobs(&self, context: JobContext) -> Vec<Self::Job>;

    fn metrics(&self) -> &MetricsConfig;

    fn logging(&self) -> &LoggingConfig;

    /// Log startup info (job count and details).
    fn log_startup_info(&self);
}

/// Application runner that handles the full startup lifecycle.
pub struct Application<C: AppConfig> {
    config: C,
    dry_run: bool,
}

impl<C: AppConfig> Application<C> {
    /// Parse args, load config, initialize tracing and run every job.
    ///
    /// Exits non-zero when config loading fails or any job fails
    /// catastrophically.
    pub fn run() -> ExitCode {
        let args = CliArgs::parse();
        let paths = args.config_paths();

        if paths.is_empty() {
            eprintln!("Error: no config files or directories specified");
            return ExitCode::FAILURE;
        }

        match Self::from_paths(&paths) {
            Ok(app) => app.with_dry_run(args.dry_run).execute(),
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                ExitCode::FAILURE
            }
        }
    }

    /// Load config from paths (useful for testing).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config = C::from_paths(paths)?;
        Ok(Self {
            config,
            dry_run: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn execute(self) -> ExitCode {
        if let Err(e) = init_tracing(self.config.logging()) {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }

        self.config.log_startup_info();
        if self.dry_run {
            info!("Dry run: files will not be moved and no audit rows will be written");
        }

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Failed to start async runtime");
                return ExitCode::FAILURE;
            }
        };

        let result = runtime.block_on(run_jobs(self.config.metrics(), self.dry_run, |context| {
            self.config.create_jobs(context)
        }));

        match result {
            Ok(summary) if summary.has_failures() => ExitCode::FAILURE,
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Job setup failed");
                ExitCode::FAILURE
            }
        }
    }
}
