//! KPI snapshot collector.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beadline_core::{BeadStore, KpiSnapshot};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::TaskError;
use crate::task::BackgroundTask;

/// Bounded in-memory history of snapshots, oldest first.
#[derive(Debug)]
pub struct KpiHistory {
    capacity: usize,
    snapshots: RwLock<VecDeque<KpiSnapshot>>,
}

impl KpiHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn push(&self, snapshot: KpiSnapshot) {
        if self.capacity == 0 {
            return;
        }
        let mut snapshots = self.snapshots.write();
        while snapshots.len() >= self.capacity {
            snapshots.pop_front();
        }
        snapshots.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<KpiSnapshot> {
        self.snapshots.read().back().cloned()
    }

    /// The most recent `limit` snapshots (all when `None`), oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<KpiSnapshot> {
        let snapshots = self.snapshots.read();
        let skip = limit.map_or(0, |limit| snapshots.len().saturating_sub(limit));
        snapshots.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

/// Read-only aggregation of the store into [`KpiHistory`].
pub struct KpiCollector {
    store: Arc<BeadStore>,
    history: Arc<KpiHistory>,
    interval: Duration,
    agent_staleness: Duration,
}

impl KpiCollector {
    pub fn new(
        store: Arc<BeadStore>,
        history: Arc<KpiHistory>,
        interval: Duration,
        agent_staleness: Duration,
    ) -> Self {
        Self {
            store,
            history,
            interval,
            agent_staleness,
        }
    }

    pub fn collect(&self) -> KpiSnapshot {
        let snapshot = self.store.kpi_snapshot(self.agent_staleness);
        debug!(
            total = snapshot.total,
            in_flight = snapshot.in_flight(),
            active_agents = snapshot.active_agents,
            "KPI snapshot collected"
        );
        self.history.push(snapshot.clone());
        snapshot
    }
}

#[async_trait]
impl BackgroundTask for KpiCollector {
    fn name(&self) -> &str {
        "kpi"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.collect();
        Ok(())
    }
}
