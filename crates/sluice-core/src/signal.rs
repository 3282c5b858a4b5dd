//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm, mut sigquit) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    ) {
        (Ok(sigint), Ok(sigterm), Ok(sigquit)) => (sigint, sigterm, sigquit),
        _ => {
            warn!("Failed to install Unix signal handlers, falling back to Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            info!(message = "Signal received.", signal = "SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
        _ = sigquit.recv() => {
            info!(message = "Signal received.", signal = "SIGQUIT");
        }
    }
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(message = "Signal received.", signal = "ctrl-c");
}

/// Cancel `token` when a shutdown signal arrives.
///
/// Jobs stop picking up new files once the token is cancelled; files
/// already in flight run to completion.
pub fn spawn_shutdown_handler(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown requested, finishing in-flight files");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}
