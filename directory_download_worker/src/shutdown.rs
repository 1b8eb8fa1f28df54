use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `cancel_token` when the process receives SIGINT (Ctrl-C) or SIGTERM
///
/// Returns once the token is cancelled, whatever cancelled it.
pub async fn wait_for_shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(?error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = cancel_token.cancelled() => return,
    }

    cancel_token.cancel();
}
