//! Prometheus metrics infrastructure with singleton-based initialization.
//!
//! One recorder is installed per process and shared by every job. The HTTP
//! endpoint is optional: batch runs usually finish before a scrape, so it is
//! only started when an address is configured.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{
    AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu, PrometheusInitSnafu,
};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Controller for the shared metrics recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

fn install() -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    CONTROLLER
        .set(MetricsController { handle })
        .map_err(|_| AlreadyInitializedSnafu.build())
}

/// Install the recorder and serve `/metrics` and `/health` on `addr`.
pub fn init_global(addr: SocketAddr) -> Result<(), MetricsError> {
    install()?;
    tokio::spawn(run_server(addr));

    info!(%addr, "Metrics server started");
    Ok(())
}

/// Install the recorder without an HTTP endpoint.
///
/// Safe to call from several test threads: losers of the race wait for the
/// winner's controller.
pub fn init_test() {
    if install().is_err() {
        while CONTROLLER.get().is_none() {
            std::hint::spin_loop();
        }
    }
}

impl MetricsController {
    /// Get a reference to the global metrics controller.
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

async fn run_server(addr: SocketAddr) {
    let Ok(controller) = MetricsController::get() else {
        error!("Metrics server started before the recorder was installed");
        return;
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(controller.handle.clone()));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
