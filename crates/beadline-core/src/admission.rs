//! Lane admission: moves `Queued` beads to `Running` in FIFO order while
//! permits are available.
//!
//! All functions here run with the lane lock held by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bead::{Bead, BeadState};
use crate::lane::LaneState;

/// Point-in-time view of a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub lane: String,
    pub budget: usize,
    pub waiting: usize,
    pub running: usize,
    pub blocked: usize,
    /// Permits currently held; running plus blocked beads.
    pub permits_held: usize,
    pub permits_available: usize,
    pub permits_acquired: u64,
    pub permits_released: u64,
}

/// Admit waiting beads until the lane runs out of permits or waiters.
///
/// Returns the admitted beads in admission order. Running out of permits is
/// not an error; the remaining beads keep their place in the queue.
pub(crate) fn admit(lane: &mut LaneState, now: DateTime<Utc>) -> Vec<Bead> {
    let mut admitted = Vec::new();

    while lane.permits.available() > 0 {
        let Some((seq, id)) = lane.waiting.pop_first() else {
            break;
        };
        let Some(record) = lane.beads.get_mut(&id) else {
            continue;
        };
        if record.bead.state != BeadState::Queued {
            tracing::warn!(bead_id = %id, state = %record.bead.state, "Dropping stale waiting entry");
            continue;
        }
        let Some(permit) = lane.permits.try_acquire(&lane.name, now) else {
            lane.waiting.insert(seq, id);
            break;
        };

        record.bead.permit_id = Some(permit.id());
        record.permit = Some(permit);
        record.bead.state = BeadState::Running;
        record.bead.transitioned_at = now;

        tracing::debug!(bead_id = %id, lane = %lane.name, "Bead admitted");
        admitted.push(record.bead.clone());
    }

    admitted
}

pub(crate) fn status(lane: &LaneState) -> LaneStatus {
    let (running, blocked) = lane
        .beads
        .values()
        .fold((0, 0), |(running, blocked), record| match record.bead.state {
            BeadState::Running => (running + 1, blocked),
            BeadState::Blocked => (running, blocked + 1),
            _ => (running, blocked),
        });

    LaneStatus {
        lane: lane.name.clone(),
        budget: lane.permits.budget(),
        waiting: lane.waiting.len(),
        running,
        blocked,
        permits_held: lane.permits.held(),
        permits_available: lane.permits.available(),
        permits_acquired: lane.permits.acquired(),
        permits_released: lane.permits.released(),
    }
}
