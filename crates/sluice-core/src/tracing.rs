//! Tracing initialization for the CLI.

use std::fs::OpenOptions;
use std::sync::Mutex;

use snafu::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{JobSetupError, LogFileSnafu};

/// Initialize tracing.
///
/// Uses `RUST_LOG` for filtering, defaulting to `info`. When `logging.file`
/// is set, the same events are also appended to that file without ANSI
/// colouring so it can be mailed as an attachment.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), JobSetupError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).context(LogFileSnafu { path: path.clone() })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(LogFileSnafu { path: path.clone() })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(())
}
