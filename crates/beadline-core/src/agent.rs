//! Agent heartbeat registry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Liveness as last observed by the heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub liveness: Liveness,
}

/// An agent whose heartbeat is older than the staleness window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleAgent {
    pub agent_id: String,
    pub last_seen: DateTime<Utc>,
    pub stale_for_secs: u64,
}

/// Tracks agents by last heartbeat. Beads reference agents by id only.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat now. Unknown agents are registered.
    pub fn heartbeat(&self, agent_id: &str) -> AgentRecord {
        self.heartbeat_at(agent_id, Utc::now())
    }

    pub fn heartbeat_at(&self, agent_id: &str, at: DateTime<Utc>) -> AgentRecord {
        let mut entry = self
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRecord {
                agent_id: agent_id.to_string(),
                registered_at: at,
                last_seen: at,
                liveness: Liveness::Alive,
            });
        if at > entry.last_seen {
            entry.last_seen = at;
        }
        entry.clone()
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|r| r.clone())
    }

    /// Whether the agent's heartbeat has expired. Unknown agents count as stale.
    pub fn is_stale(&self, agent_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.agents
            .get(agent_id)
            .is_none_or(|record| elapsed(record.last_seen, now) > window)
    }

    pub fn stale_agents(&self, now: DateTime<Utc>, window: Duration) -> Vec<StaleAgent> {
        let mut stale: Vec<_> = self
            .agents
            .iter()
            .filter_map(|record| {
                let age = elapsed(record.last_seen, now);
                (age > window).then(|| StaleAgent {
                    agent_id: record.agent_id.clone(),
                    last_seen: record.last_seen,
                    stale_for_secs: age.as_secs(),
                })
            })
            .collect();
        stale.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        stale
    }

    pub fn active_count(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.agents
            .iter()
            .filter(|record| elapsed(record.last_seen, now) <= window)
            .count()
    }

    /// Re-evaluate liveness and return the agents whose liveness changed.
    pub fn refresh_liveness(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Vec<(String, Liveness)> {
        let mut changed = Vec::new();
        for mut record in self.agents.iter_mut() {
            let liveness = if elapsed(record.last_seen, now) > window {
                Liveness::Stale
            } else {
                Liveness::Alive
            };
            if record.liveness != liveness {
                record.liveness = liveness;
                changed.push((record.agent_id.clone(), liveness));
            }
        }
        changed.sort_by(|a, b| a.0.cmp(&b.0));
        changed
    }

    /// Drop agents unseen since `cutoff`. Returns the number removed.
    pub fn forget_unseen(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.agents.len();
        self.agents.retain(|_, record| record.last_seen >= cutoff);
        before - self.agents.len()
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        let mut agents: Vec<_> = self.agents.iter().map(|r| r.clone()).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
