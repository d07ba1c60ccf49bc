//! Process-wide shutdown broadcast.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

use crate::error::DaemonError;

/// Shared shutdown signal. Cloning shares the same state.
///
/// [`trigger`](Self::trigger) fires the broadcast exactly once; later calls
/// are no-ops.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` only for the call that fired it.
    pub fn trigger(&self, reason: &str) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(reason, "Shutdown already requested");
            return false;
        }
        *self.reason.lock() = Some(reason.to_string());
        info!(reason, "Shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why shutdown was requested, once it has been.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Completes once shutdown is triggered.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Token for handing to code that only needs to observe cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown on SIGINT, SIGTERM or SIGQUIT (Ctrl+C elsewhere).
    pub fn listen_for_os_signals(&self) -> Result<(), DaemonError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let setup = |kind| signal(kind).map_err(|e| DaemonError::SignalSetup(e.to_string()));
            let mut sigint = setup(SignalKind::interrupt())?;
            let mut sigterm = setup(SignalKind::terminate())?;
            let mut sigquit = setup(SignalKind::quit())?;

            let shutdown = self.clone();
            tokio::spawn(async move {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigquit.recv() => "SIGQUIT",
                    _ = shutdown.cancelled() => return,
                };
                info!("Received {}", name);
                shutdown.trigger(name);
            });
            info!("OS signal handlers installed (SIGINT, SIGTERM, SIGQUIT)");
        }

        #[cfg(not(unix))]
        {
            let shutdown = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            info!("Received Ctrl+C");
                            shutdown.trigger("ctrl-c");
                        }
                    }
                    _ = shutdown.cancelled() => {}
                }
            });
            info!("OS signal handlers installed (Ctrl+C only)");
        }

        Ok(())
    }
}
