//! Graceful shutdown using `CancellationToken`
//!
//! One controller owns the root token. The HTTP server, the cache sweeper and
//! the upstream health probe each run on a child token, so cancelling the
//! root stops all of them.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the service's tasks
///
/// ```ignore
/// let shutdown = ShutdownController::with_signals();
///
/// let sweeper = coordinator.spawn_sweeper(shutdown.child_token());
/// server.run(shutdown.child_token()).await?;
/// ```
#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Controller cancelled on Ctrl+C, or SIGTERM on unix
    pub fn with_signals() -> Self {
        let controller = Self::new();
        let token = controller.token.clone();

        tokio::spawn(async move {
            wait_for_signal().await;
            token.cancel();
        });

        controller
    }

    /// Token cancelled together with this controller
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn shutdown(&self) {
        info!("Manual shutdown triggered");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = terminate.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
