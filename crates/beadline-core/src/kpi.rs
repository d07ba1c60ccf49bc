//! KPI snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bead::BeadState;

/// Aggregated bead counts at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub timestamp: DateTime<Utc>,
    pub counts_by_state: BTreeMap<BeadState, u64>,
    pub counts_by_lane: BTreeMap<String, u64>,
    pub total: u64,
    pub active_agents: usize,
}

impl KpiSnapshot {
    /// Snapshot with every state present at zero.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            counts_by_state: BeadState::ALL.into_iter().map(|s| (s, 0)).collect(),
            counts_by_lane: BTreeMap::new(),
            total: 0,
            active_agents: 0,
        }
    }

    pub(crate) fn record_lane(&mut self, lane: &str, states: impl Iterator<Item = BeadState>) {
        let lane_count = self.counts_by_lane.entry(lane.to_string()).or_insert(0);
        for state in states {
            *lane_count += 1;
            *self.counts_by_state.entry(state).or_insert(0) += 1;
            self.total += 1;
        }
    }

    pub fn count(&self, state: BeadState) -> u64 {
        self.counts_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Beads that are queued, running or blocked.
    pub fn in_flight(&self) -> u64 {
        self.count(BeadState::Queued) + self.count(BeadState::Running) + self.count(BeadState::Blocked)
    }
}
