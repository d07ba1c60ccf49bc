//! Retention cleanup for terminal beads and long-unseen agents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beadline_config::DaemonConfig;
use beadline_core::BeadStore;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::error::TaskError;
use crate::task::BackgroundTask;

pub struct CleanupTask {
    store: Arc<BeadStore>,
    interval: Duration,
    retention: Duration,
    agent_forget: Duration,
}

impl CleanupTask {
    pub fn new(store: Arc<BeadStore>, config: &DaemonConfig) -> Self {
        Self {
            store,
            interval: config.cleanup_interval(),
            retention: config.retention(),
            agent_forget: config.agent_forget(),
        }
    }

    /// Returns `(beads evicted, agents forgotten)`.
    pub fn sweep(&self, now: DateTime<Utc>) -> (usize, usize) {
        let beads = self.store.evict_terminal(now - to_delta(self.retention));
        let agents = self
            .store
            .agents()
            .forget_unseen(now - to_delta(self.agent_forget));

        if beads > 0 || agents > 0 {
            info!(beads, agents, "Cleanup evicted expired entries");
        } else {
            debug!("Cleanup found nothing to evict");
        }
        (beads, agents)
    }
}

#[async_trait]
impl BackgroundTask for CleanupTask {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.sweep(Utc::now());
        Ok(())
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
