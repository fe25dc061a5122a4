//! OS signal handling.
//!
//! # Responsibilities
//! - Translate SIGTERM and SIGINT into `ShutdownCoordinator::trigger`
//! - Trigger the coordinator on the normal process exit path
//!
//! # Design Decisions
//! - Only these two signals are handled; SIGHUP and friends keep their defaults
//! - Installing twice is harmless: `ShutdownCoordinator::start` gates the spawn

use crate::lifecycle::shutdown::{ShutdownCause, ShutdownCoordinator};

/// Wait for the first termination signal.
pub async fn wait_for_termination() -> ShutdownCause {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => ShutdownCause::Terminate,
                    _ = interrupt() => ShutdownCause::Interrupt,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install SIGTERM handler");
                interrupt().await;
                ShutdownCause::Interrupt
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt().await;
        ShutdownCause::Interrupt
    }
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

/// Spawn the signal listener for `coordinator`. Returns false when it was already installed.
pub fn install(coordinator: &ShutdownCoordinator) -> bool {
    if !coordinator.start() {
        return false;
    }
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        let cause = wait_for_termination().await;
        tracing::info!(event = "signal_received", signal = %cause, "Termination signal received");
        coordinator.trigger(cause);
    });
    true
}

/// Triggers the coordinator when dropped at the end of `main`.
#[must_use = "the guard triggers shutdown when it is dropped"]
pub struct ExitGuard {
    coordinator: ShutdownCoordinator,
}

impl ExitGuard {
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self { coordinator }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.coordinator.trigger(ShutdownCause::ProcessExit);
    }
}
