//! Running configured jobs with shared shutdown handling.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use snafu::ResultExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MetricsConfig;
use crate::emit;
use crate::error::{AddressParseSnafu, JobSetupError, MetricsSnafu};
use crate::metrics::events::{JobCompleted, JobDuration, JobStatus};
use crate::signal::spawn_shutdown_handler;

/// Shared resources for job execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Cancellation token for graceful shutdown.
    pub shutdown: CancellationToken,
    /// Classify and validate only; no moves, no audit writes.
    pub dry_run: bool,
}

impl JobContext {
    pub fn new(shutdown: CancellationToken, dry_run: bool) -> Self {
        Self { shutdown, dry_run }
    }
}

/// A self-contained job that can be executed.
///
/// An `Err` from [`Job::run`] means the job could not do its work at all
/// (catastrophic failure); per-item problems are handled inside the job.
pub trait Job: Send + 'static {
    /// The key type used to identify this job.
    type Key: Clone + Display + Send + 'static;

    /// The error type returned by this job.
    type Error: std::error::Error + Send + 'static;

    /// Get a reference to the job's key.
    fn key(&self) -> &Self::Key;

    /// Run this job to completion.
    fn run(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Tally of job outcomes for one process run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    /// True when at least one job failed catastrophically or panicked.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Runs multiple jobs concurrently and collects their outcomes.
pub struct JobRunner<J: Job> {
    jobs: Vec<J>,
}

impl<J: Job> JobRunner<J> {
    pub fn new(jobs: Vec<J>) -> Self {
        Self { jobs }
    }

    /// Run all jobs to completion.
    pub async fn run(self) -> RunSummary {
        let mut handles: JoinSet<(J::Key, Result<(), J::Error>)> = JoinSet::new();

        for job in self.jobs {
            let key = job.key().clone();
            handles.spawn(async move {
                let start = Instant::now();
                let result = job.run().await;
                emit!(JobDuration {
                    job: key.to_string(),
                    duration: start.elapsed(),
                });
                (key, result)
            });
        }

        info!("Spawned {} job tasks", handles.len());

        let mut summary = RunSummary::default();
        while let Some(result) = handles.join_next().await {
            match result {
                Ok((key, Ok(()))) => {
                    info!(target = %key, "Job completed");
                    emit!(JobCompleted {
                        job: key.to_string(),
                        status: JobStatus::Success,
                    });
                    summary.succeeded += 1;
                }
                Ok((key, Err(e))) => {
                    error!(target = %key, error = %e, "Job failed");
                    emit!(JobCompleted {
                        job: key.to_string(),
                        status: JobStatus::Failed,
                    });
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Job task panicked");
                    emit!(JobCompleted {
                        job: "unknown".to_string(),
                        status: JobStatus::Panicked,
                    });
                    summary.failed += 1;
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "All jobs complete"
        );
        summary
    }
}

/// Run jobs with shared setup logic.
///
/// 1. Install the metrics recorder (and endpoint, if an address is set)
/// 2. Create the shutdown token and wire it to process signals
/// 3. Create jobs via the provided closure
/// 4. Run all jobs to completion
pub async fn run_jobs<J, F>(
    metrics: &MetricsConfig,
    dry_run: bool,
    create_jobs: F,
) -> Result<RunSummary, JobSetupError>
where
    J: Job,
    F: FnOnce(JobContext) -> Vec<J>,
{
    if let Some(address) = &metrics.address {
        let addr = address.parse().context(AddressParseSnafu)?;
        crate::metrics::init_global(addr).context(MetricsSnafu)?;
    }

    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(shutdown.clone());

    let jobs = create_jobs(JobContext::new(shutdown.clone(), dry_run));
    let summary = JobRunner::new(jobs).run().await;

    // Releases the signal handler task.
    shutdown.cancel();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(display("job exploded"))]
    struct Exploded;

    struct FakeJob {
        key: String,
        fail: bool,
    }

    impl Job for FakeJob {
        type Key = String;
        type Error = Exploded;

        fn key(&self) -> &String {
            &self.key
        }

        async fn run(self) -> Result<(), Exploded> {
            if self.fail { Err(Exploded) } else { Ok(()) }
        }
    }

    #[tokio::test]
    async fn test_runner_counts_outcomes() {
        let jobs = vec![
            FakeJob {
                key: "saas".to_string(),
                fail: false,
            },
            FakeJob {
                key: "box".to_string(),
                fail: true,
            },
            FakeJob {
                key: "crm".to_string(),
                fail: false,
            },
        ];

        let summary = JobRunner::new(jobs).run().await;
        assert_eq!(
            summary,
            RunSummary {
                succeeded: 2,
                failed: 1
            }
        );
        assert!(summary.has_failures());
    }

    #[tokio::test]
    async fn test_run_jobs_without_metrics_address() {
        let summary = run_jobs(&MetricsConfig::default(), true, |context| {
            assert!(context.dry_run);
            vec![FakeJob {
                key: "saas".to_string(),
                fail: false,
            }]
        })
        .await
        .unwrap();

        assert!(!summary.has_failures());
    }

    #[tokio::test]
    async fn test_run_jobs_rejects_bad_metrics_address() {
        let metrics = MetricsConfig {
            address: Some("not-an-address".to_string()),
        };
        let result = run_jobs(&metrics, false, |_| Vec::<FakeJob>::new()).await;
        assert!(matches!(result, Err(JobSetupError::AddressParse { .. })));
    }
}
