use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Conventional exit status for runs interrupted by a signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Turns SIGINT/SIGTERM into a cancellation so runs and workers stop
/// at the next chunk boundary instead of dying mid-write.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Installs the signal listeners and hands back the coordinator.
    pub fn install() -> Self {
        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            wait_for_signal().await;
            cancel.cancel();
            info!("Shutdown signal broadcast, jobs stop at the next chunk boundary");
        });

        ShutdownCoordinator { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// True once a signal has been observed.
    pub fn interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
