//! Shutdown coordination: one root CancellationToken shared by the
//! scheduler and the OS signal listener.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to loops that must stop on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown on Ctrl-C, or SIGTERM on unix.
    pub fn spawn_signal_listener(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = coordinator.token.cancelled() => return,
                _ = wait_for_signal() => {}
            }
            coordinator.trigger();
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = term.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}
