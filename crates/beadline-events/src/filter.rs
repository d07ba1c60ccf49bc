use beadline_core::{BeadEvent, BeadId, BeadState};
use serde::{Deserialize, Serialize};

/// Subscriber-side event filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub lane: Option<String>,
    #[serde(default)]
    pub bead_id: Option<BeadId>,
    /// Matches on the state an event moves into.
    #[serde(default)]
    pub state: Option<BeadState>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn lane(lane: impl Into<String>) -> Self {
        Self {
            lane: Some(lane.into()),
            ..Self::default()
        }
    }

    pub fn bead(bead_id: BeadId) -> Self {
        Self {
            bead_id: Some(bead_id),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: BeadState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn matches(&self, event: &BeadEvent) -> bool {
        self.lane.as_deref().is_none_or(|lane| event.lane == lane)
            && self.bead_id.is_none_or(|id| event.bead_id == id)
            && self.state.is_none_or(|state| event.new_state == state)
    }
}
