//! Job orchestration primitives.
//!
//! - [`Job`]: a self-contained unit of work (one configured source)
//! - [`JobContext`]: resources shared by every job in the process
//! - [`JobRunner`]: runs jobs concurrently and tallies their outcomes
//! - [`run_jobs`]: metrics setup, shutdown wiring and execution in one call

mod job;

pub use job::{Job, JobContext, JobRunner, RunSummary, run_jobs};
