//! Metrics and observability infrastructure.
//!
//! - `events`: the `InternalEvent` trait plus storage and job-level events
//! - `server`: Prometheus recorder and the `/metrics` + `/health` endpoint

pub mod events;
pub mod server;

pub use server::{MetricsController, init_global, init_test};

/// Emit a metric event.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding counter, gauge or histogram.
///
/// ```ignore
/// use sluice_core::metrics::events::{JobCompleted, JobStatus};
///
/// emit!(JobCompleted { job: "saas".into(), status: JobStatus::Success });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
