//! Cancels in-flight work on SIGINT or SIGTERM.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawns a task that cancels `token` on the first shutdown signal.
///
/// The task also ends quietly once `token` is cancelled for any other reason.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => {
                if received {
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Wait for SIGINT or SIGTERM. Returns `false` if no handler could be installed.
async fn wait_for_signal() -> bool {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                true
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<bool>();

    tokio::select! {
        received = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), cancelling");
            received
        }
        received = terminate => {
            info!("Received SIGTERM, cancelling");
            received
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_ends_when_token_cancelled() {
        let token = CancellationToken::new();
        let handle = cancel_on_signal(token.clone());

        token.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
