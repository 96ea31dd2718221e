use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the process root cancellation token and ties it to OS signals.
///
/// Cancelling the root cascades to every supervision loop and every command
/// source; the `shutdown` command triggers the same token from inside the
/// pipeline.
#[derive(Clone)]
pub struct ShutdownManager {
    root: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn trigger(&self) {
        if !self.root.is_cancelled() {
            info!("Shutdown triggered");
            self.root.cancel();
        }
    }

    pub async fn wait(&self) {
        self.root.cancelled().await;
    }

    /// Resolves when Ctrl+C or SIGTERM arrives, or when the root token is
    /// cancelled from inside the process (the `shutdown` command).
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if signal::ctrl_c().await.is_err() {
                // signal handler installation failed, fall back to the token
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
            _ = self.root.cancelled() => info!("Shutdown requested from inside the process"),
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
