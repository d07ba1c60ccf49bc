//! Agent heartbeat monitor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beadline_core::{AgentRegistry, Liveness};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::task::BackgroundTask;

/// Logs agents crossing the staleness window in either direction.
/// Failing their beads is left to patrol.
pub struct HeartbeatMonitor {
    agents: Arc<AgentRegistry>,
    interval: Duration,
    staleness: Duration,
}

impl HeartbeatMonitor {
    pub fn new(agents: Arc<AgentRegistry>, interval: Duration, staleness: Duration) -> Self {
        Self {
            agents,
            interval,
            staleness,
        }
    }

    /// Re-evaluate liveness at `now`; returns the agents whose liveness changed.
    pub fn check(&self, now: DateTime<Utc>) -> Vec<(String, Liveness)> {
        let changed = self.agents.refresh_liveness(now, self.staleness);
        for (agent_id, liveness) in &changed {
            match liveness {
                Liveness::Stale => {
                    let last_seen = self.agents.get(agent_id).map(|a| a.last_seen);
                    warn!(agent_id = %agent_id, last_seen = ?last_seen, "Agent heartbeat stale");
                }
                Liveness::Alive => info!(agent_id = %agent_id, "Agent heartbeat recovered"),
            }
        }
        debug!(
            agents = self.agents.len(),
            active = self.agents.active_count(now, self.staleness),
            "Heartbeat check complete"
        );
        changed
    }
}

#[async_trait]
impl BackgroundTask for HeartbeatMonitor {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.check(Utc::now());
        Ok(())
    }
}
