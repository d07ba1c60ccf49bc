//! Application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use beadline_core::BeadStore;
use beadline_daemon::Daemon;

/// State shared across handlers.
pub struct AppState {
    pub daemon: Arc<Daemon>,
    start_time: Instant,
    request_count: AtomicU64,
}

impl AppState {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self {
            daemon,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<BeadStore> {
        self.daemon.store()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Route an API shutdown request to the daemon's shutdown signal.
    /// Returns `true` if this call fired it.
    pub fn request_shutdown(&self) -> bool {
        self.daemon.shutdown().trigger("api request")
    }
}
