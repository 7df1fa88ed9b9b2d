//! Shutdown triggers for the proxy servers.

use std::time::Duration;

/// How often the parent process is checked.
pub const PARENT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                // Fall through to let ctrl_c handle shutdown
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}

/// Resolves once the process that started us has exited, detected by our
/// parent pid changing (the orphan is reparented to init or a subreaper).
pub async fn parent_exit(poll_interval: Duration) {
    let original = std::os::unix::process::parent_id();
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        let current = std::os::unix::process::parent_id();
        if current != original {
            tracing::info!(
                "Parent process {} exited (now {}), shutting down",
                original,
                current
            );
            return;
        }
    }
}

/// Resolves on a signal or, when `watch_parent` is set, on parent exit.
pub async fn shutdown_trigger(watch_parent: bool) {
    if watch_parent {
        tokio::select! {
            () = shutdown_signal() => {}
            () = parent_exit(PARENT_POLL_INTERVAL) => {}
        }
    } else {
        shutdown_signal().await;
    }
}
