//! Patrol: reclaims permits from beads that can no longer make progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beadline_config::DaemonConfig;
use beadline_core::{Bead, BeadFilter, BeadState, BeadStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::task::BackgroundTask;

/// What one patrol pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatrolReport {
    pub stuck: Vec<Bead>,
    pub stale_agent: Vec<Bead>,
    pub blocked_timeout: Vec<Bead>,
    pub admitted: usize,
}

impl PatrolReport {
    pub fn failed(&self) -> usize {
        self.stuck.len() + self.stale_agent.len() + self.blocked_timeout.len()
    }
}

pub struct PatrolTask {
    store: Arc<BeadStore>,
    interval: Duration,
    stuck_threshold: Duration,
    heartbeat_staleness: Duration,
    blocked_timeout: Option<Duration>,
}

impl PatrolTask {
    pub fn new(store: Arc<BeadStore>, config: &DaemonConfig) -> Self {
        Self {
            store,
            interval: config.patrol_interval(),
            stuck_threshold: config.stuck_threshold(),
            heartbeat_staleness: config.heartbeat_staleness(),
            blocked_timeout: config.blocked_timeout(),
        }
    }

    /// Run one pass at `now`.
    pub fn patrol(&self, now: DateTime<Utc>) -> PatrolReport {
        let mut report = PatrolReport::default();
        let agents = self.store.agents();

        let candidates = self
            .store
            .list(&BeadFilter::default().with_state(BeadState::Running))
            .into_iter()
            .chain(self.store.list(&BeadFilter::default().with_state(BeadState::Blocked)));

        for bead in candidates {
            let observed_at = bead.transitioned_at;
            let observed_state = bead.state;
            let age = elapsed(observed_at, now);

            let stale_agent = bead
                .agent_id
                .as_deref()
                .filter(|agent_id| agents.is_stale(agent_id, now, self.heartbeat_staleness));
            if let Some(agent_id) = stale_agent {
                let reason = format!("agent {agent_id} heartbeat expired");
                let failed = self.store.fail_if(bead.id, &reason, |current| {
                    current.agent_id.as_deref() == Some(agent_id)
                        && agents.is_stale(agent_id, now, self.heartbeat_staleness)
                });
                if let Some(failed) = self.settle(bead.id, failed) {
                    warn!(bead_id = %failed.id, agent_id, lane = %failed.lane, "Stale agent, bead failed and permit reclaimed");
                    report.stale_agent.push(failed);
                }
                continue;
            }

            let limit = match observed_state {
                BeadState::Running => Some(self.stuck_threshold),
                BeadState::Blocked => self.blocked_timeout,
                _ => None,
            };
            if !limit.is_some_and(|limit| age > limit) {
                continue;
            }

            let reason = format!("{observed_state} for {}s without progress", age.as_secs());
            let failed = self.store.fail_if(bead.id, &reason, |current| {
                current.state == observed_state && current.transitioned_at == observed_at
            });
            if let Some(failed) = self.settle(bead.id, failed) {
                warn!(bead_id = %failed.id, lane = %failed.lane, state = %observed_state, age_secs = age.as_secs(), "Bead exceeded its time limit, failed");
                match observed_state {
                    BeadState::Blocked => report.blocked_timeout.push(failed),
                    _ => report.stuck.push(failed),
                }
            }
        }

        report.admitted = self.store.admit_all().len();
        if report.failed() > 0 || report.admitted > 0 {
            info!(
                stuck = report.stuck.len(),
                stale_agent = report.stale_agent.len(),
                blocked_timeout = report.blocked_timeout.len(),
                admitted = report.admitted,
                "Patrol pass complete"
            );
        } else {
            debug!("Patrol pass complete, nothing to do");
        }
        report
    }

    fn settle(
        &self,
        id: beadline_core::BeadId,
        result: Result<Option<Bead>, beadline_core::CoreError>,
    ) -> Option<Bead> {
        match result {
            Ok(failed) => failed,
            Err(e) => {
                debug!(bead_id = %id, error = %e, "Patrol skipped bead");
                None
            }
        }
    }
}

#[async_trait]
impl BackgroundTask for PatrolTask {
    fn name(&self) -> &str {
        "patrol"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.patrol(Utc::now());
        Ok(())
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadline_config::LaneConfig;
    use chrono::TimeDelta;

    fn config() -> DaemonConfig {
        DaemonConfig {
            stuck_threshold_secs: 600,
            heartbeat_staleness_secs: 60,
            blocked_timeout_secs: Some(300),
            ..DaemonConfig::default()
        }
    }

    fn store() -> Arc<BeadStore> {
        Arc::new(BeadStore::new(&[LaneConfig::new("critical", 1)]))
    }

    #[test]
    fn test_fresh_running_bead_is_left_alone() {
        let store = store();
        let bead = store.create("b", "critical").unwrap();
        let patrol = PatrolTask::new(store.clone(), &config());

        let report = patrol.patrol(Utc::now());
        assert_eq!(report.failed(), 0);
        assert_eq!(store.get(bead.id).unwrap().state, BeadState::Running);
    }

    #[test]
    fn test_stuck_bead_fails_and_frees_permit() {
        let store = store();
        let stuck = store.create("stuck", "critical").unwrap();
        let next = store.create("next", "critical").unwrap();
        let patrol = PatrolTask::new(store.clone(), &config());

        let report = patrol.patrol(Utc::now() + TimeDelta::seconds(601));
        assert_eq!(report.stuck.len(), 1);
        let failed = store.get(stuck.id).unwrap();
        assert_eq!(failed.state, BeadState::Failed);
        assert!(failed.last_error.unwrap().contains("running"));
        assert_eq!(store.get(next.id).unwrap().state, BeadState::Running);
    }

    #[test]
    fn test_stale_agent_fails_bead() {
        let store = store();
        let bead = store.create("b", "critical").unwrap();
        store.bind_agent(bead.id, "agent-1").unwrap();
        let patrol = PatrolTask::new(store.clone(), &config());

        // Heartbeat 30s old: still alive.
        assert_eq!(patrol.patrol(Utc::now() + TimeDelta::seconds(30)).failed(), 0);

        let report = patrol.patrol(Utc::now() + TimeDelta::seconds(120));
        assert_eq!(report.stale_agent.len(), 1);
        assert_eq!(store.get(bead.id).unwrap().state, BeadState::Failed);
    }

    #[test]
    fn test_blocked_timeout() {
        let store = store();
        let bead = store.create("b", "critical").unwrap();
        store.block(bead.id, "waiting").unwrap();
        let patrol = PatrolTask::new(store.clone(), &config());

        assert_eq!(patrol.patrol(Utc::now() + TimeDelta::seconds(100)).failed(), 0);
        let report = patrol.patrol(Utc::now() + TimeDelta::seconds(301));
        assert_eq!(report.blocked_timeout.len(), 1);
        assert_eq!(store.get(bead.id).unwrap().state, BeadState::Failed);
    }

    #[test]
    fn test_blocked_without_timeout_is_kept() {
        let store = store();
        let bead = store.create("b", "critical").unwrap();
        store.block(bead.id, "waiting").unwrap();
        let config = DaemonConfig {
            blocked_timeout_secs: None,
            ..config()
        };
        let patrol = PatrolTask::new(store.clone(), &config);

        assert_eq!(patrol.patrol(Utc::now() + TimeDelta::days(7)).failed(), 0);
        assert_eq!(store.get(bead.id).unwrap().state, BeadState::Blocked);
    }

    #[tokio::test]
    async fn test_tick_never_fails() {
        let patrol = PatrolTask::new(store(), &config());
        assert!(patrol.tick().await.is_ok());
        assert_eq!(patrol.name(), "patrol");
    }
}
