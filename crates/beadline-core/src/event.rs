//! State-change events and the sink seam used by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bead::{Bead, BeadId, BeadState};

/// Immutable record of one committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeadEvent {
    /// Store-wide publication sequence.
    pub seq: u64,
    pub bead_id: BeadId,
    pub lane: String,
    /// `None` for the creation event.
    pub old_state: Option<BeadState>,
    pub new_state: BeadState,
    pub timestamp: DateTime<Utc>,
}

impl BeadEvent {
    pub(crate) fn for_bead(seq: u64, bead: &Bead, old_state: Option<BeadState>) -> Self {
        Self {
            seq,
            bead_id: bead.id,
            lane: bead.lane.clone(),
            old_state,
            new_state: bead.state,
            timestamp: bead.transitioned_at,
        }
    }
}

/// Receiver of committed transitions.
///
/// Called with the lane lock held, so implementations must not block,
/// perform I/O, or call back into the store.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &BeadEvent);
}
