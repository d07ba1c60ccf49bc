//! Lanes and permits.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bead::{Bead, BeadId};

/// Right to run inside a lane's budget.
///
/// Not `Clone`: a permit is moved into the bead record on admission and
/// moved back out exactly once on release.
#[derive(Debug)]
pub struct Permit {
    id: Uuid,
    lane: String,
    acquired_at: DateTime<Utc>,
}

impl Permit {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lane(&self) -> &str {
        &self.lane
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

/// Permit accounting for a single lane.
#[derive(Debug)]
pub(crate) struct LanePermits {
    budget: usize,
    held: usize,
    acquired: u64,
    released: u64,
}

impl LanePermits {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            held: 0,
            acquired: 0,
            released: 0,
        }
    }

    pub(crate) fn budget(&self) -> usize {
        self.budget
    }

    /// Shrinking below the held count does not preempt; new permits are
    /// withheld until enough are released.
    pub(crate) fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    pub(crate) fn held(&self) -> usize {
        self.held
    }

    pub(crate) fn available(&self) -> usize {
        self.budget.saturating_sub(self.held)
    }

    pub(crate) fn acquired(&self) -> u64 {
        self.acquired
    }

    pub(crate) fn released(&self) -> u64 {
        self.released
    }

    pub(crate) fn try_acquire(&mut self, lane: &str, now: DateTime<Utc>) -> Option<Permit> {
        if self.available() == 0 {
            return None;
        }
        self.held += 1;
        self.acquired += 1;
        Some(Permit {
            id: Uuid::new_v4(),
            lane: lane.to_string(),
            acquired_at: now,
        })
    }

    pub(crate) fn release(&mut self, permit: Permit) {
        debug_assert!(self.held > 0, "release without a held permit");
        tracing::trace!(permit_id = %permit.id, lane = %permit.lane, "Permit released");
        self.held = self.held.saturating_sub(1);
        self.released += 1;
    }
}

/// Authoritative bead record; the permit lives here, the bead only carries its id.
#[derive(Debug)]
pub(crate) struct BeadRecord {
    pub(crate) bead: Bead,
    pub(crate) permit: Option<Permit>,
}

/// Everything guarded by one lane lock.
#[derive(Debug)]
pub(crate) struct LaneState {
    pub(crate) name: String,
    pub(crate) permits: LanePermits,
    pub(crate) beads: HashMap<BeadId, BeadRecord>,
    /// Queued beads keyed by creation sequence.
    pub(crate) waiting: BTreeMap<u64, BeadId>,
}

impl LaneState {
    pub(crate) fn new(name: impl Into<String>, budget: usize) -> Self {
        Self {
            name: name.into(),
            permits: LanePermits::new(budget),
            beads: HashMap::new(),
            waiting: BTreeMap::new(),
        }
    }
}
