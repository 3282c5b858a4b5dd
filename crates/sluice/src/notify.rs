//! Run-level notifications.
//!
//! Delivery is fire-and-forget: failures are logged and never fail the run.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ExitSnafu, NotifyError, SpawnSnafu, StdinSnafu};

/// Overall result of a run as shown in the subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Fatal => "FATAL",
        }
    }
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl Notification {
    pub fn new(source: &str, environment: &str, severity: Severity, body: String) -> Self {
        Self {
            subject: subject(source, environment, severity),
            body,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Option<PathBuf>) -> Self {
        self.attachment = attachment;
        self
    }
}

/// `"{source} | Validation | {SEVERITY} | {environment}"`
pub fn subject(source: &str, environment: &str, severity: Severity) -> String {
    format!("{source} | Validation | {} | {environment}", severity.as_str())
}

/// The log file, if it exists and is at most `max_bytes` long.
pub async fn log_attachment(path: Option<&Path>, max_bytes: u64) -> Option<PathBuf> {
    let path = path?;
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() <= max_bytes => Some(path.to_path_buf()),
        Ok(meta) => {
            debug!(
                path = %path.display(),
                size = meta.len(),
                max_bytes,
                "Log file too large to attach"
            );
            None
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Log file not available for attachment");
            None
        }
    }
}

/// Sink for run notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Deliver `notification`, logging instead of returning any failure.
pub async fn send(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.notify(notification).await {
        warn!(subject = %notification.subject, error = %e, "Notification failed");
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(subject = %notification.subject, "{}", notification.body);
        Ok(())
    }
}

/// Runs a `mailx`-compatible program: `<program> -s <subject> [-a <file>]
/// <recipients...>` with the body on stdin. No shell is involved.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    recipients: Vec<String>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            program: program.into(),
            recipients,
        }
    }

    fn command(&self, notification: &Notification) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("-s").arg(&notification.subject);
        if let Some(attachment) = &notification.attachment {
            command.arg("-a").arg(attachment);
        }
        command
            .args(&self.recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut child = self.command(notification).spawn().context(SpawnSnafu {
            command: self.program.clone(),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(notification.body.as_bytes())
                .await
                .context(StdinSnafu {
                    command: self.program.clone(),
                })?;
            // Closing stdin ends the body.
            drop(stdin);
        }

        let status = child.wait().await.context(SpawnSnafu {
            command: self.program.clone(),
        })?;
        ensure!(
            status.success(),
            ExitSnafu {
                command: self.program.clone(),
                status: status.to_string(),
            }
        );

        debug!(
            subject = %notification.subject,
            recipients = self.recipients.len(),
            "Notification sent"
        );
        Ok(())
    }
}
