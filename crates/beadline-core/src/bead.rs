//! Bead definition and state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bead identifier.
pub type BeadId = Uuid;

/// Lifecycle state of a bead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadState {
    /// Stored, not yet eligible for admission.
    Created,
    /// Waiting for a permit in its lane.
    Queued,
    /// Holding a permit.
    Running,
    /// Parked while holding its permit (e.g. missing credential).
    Blocked,
    /// Completed successfully.
    Done,
    /// Failed, by request or by patrol.
    Failed,
    /// Cancelled.
    Cancelled,
}

impl BeadState {
    pub const ALL: [BeadState; 7] = [
        BeadState::Created,
        BeadState::Queued,
        BeadState::Running,
        BeadState::Blocked,
        BeadState::Done,
        BeadState::Failed,
        BeadState::Cancelled,
    ];

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BeadState::Done | BeadState::Failed | BeadState::Cancelled)
    }

    /// States in which the bead owns a lane permit.
    pub fn holds_permit(self) -> bool {
        matches!(self, BeadState::Running | BeadState::Blocked)
    }

    /// Whether `self -> target` is an edge of the bead graph.
    pub fn can_transition_to(self, target: BeadState) -> bool {
        use BeadState::*;

        if target == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Created, Queued)
                | (Queued, Running)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Blocked)
                | (Blocked, Running)
                | (Blocked, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BeadState::Created => "created",
            BeadState::Queued => "queued",
            BeadState::Running => "running",
            BeadState::Blocked => "blocked",
            BeadState::Done => "done",
            BeadState::Failed => "failed",
            BeadState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BeadState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BeadState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown bead state: {s}"))
    }
}

/// A unit of work tracked by the store.
///
/// Values handed out by the store are snapshots; the store keeps the
/// authoritative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    pub id: BeadId,
    pub title: String,
    pub lane: String,
    pub state: BeadState,
    /// Creation sequence number, FIFO tie-breaker within a lane.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last state transition.
    pub transitioned_at: DateTime<Utc>,
    /// Bound agent, by id only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub retry_count: u32,
    /// Id of the permit currently held, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_on: Option<String>,
}

impl Bead {
    pub(crate) fn new(title: String, lane: String, seq: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            lane,
            state: BeadState::Created,
            seq,
            created_at: now,
            transitioned_at: now,
            agent_id: None,
            retry_count: 0,
            permit_id: None,
            last_error: None,
            blocked_on: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Query filter for listing beads. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeadFilter {
    #[serde(default)]
    pub state: Option<BeadState>,
    #[serde(default)]
    pub lane: Option<String>,
    #[serde(default, rename = "agent")]
    pub agent_id: Option<String>,
}

impl BeadFilter {
    pub fn with_state(mut self, state: BeadState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_lane(mut self, lane: impl Into<String>) -> Self {
        self.lane = Some(lane.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn matches(&self, bead: &Bead) -> bool {
        self.state.is_none_or(|state| bead.state == state)
            && self.lane.as_deref().is_none_or(|lane| bead.lane == lane)
            && self
                .agent_id
                .as_deref()
                .is_none_or(|agent| bead.agent_id.as_deref() == Some(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(BeadState::Done.is_terminal());
        assert!(BeadState::Failed.is_terminal());
        assert!(BeadState::Cancelled.is_terminal());
        assert!(!BeadState::Blocked.is_terminal());
        assert!(!BeadState::Created.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in BeadState::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in BeadState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_forward_edges() {
        assert!(BeadState::Created.can_transition_to(BeadState::Queued));
        assert!(BeadState::Queued.can_transition_to(BeadState::Running));
        assert!(BeadState::Running.can_transition_to(BeadState::Done));
        assert!(BeadState::Running.can_transition_to(BeadState::Blocked));
        assert!(BeadState::Blocked.can_transition_to(BeadState::Running));
        assert!(BeadState::Blocked.can_transition_to(BeadState::Failed));
    }

    #[test]
    fn test_rejected_edges() {
        assert!(!BeadState::Created.can_transition_to(BeadState::Running));
        assert!(!BeadState::Queued.can_transition_to(BeadState::Done));
        assert!(!BeadState::Blocked.can_transition_to(BeadState::Done));
        assert!(!BeadState::Running.can_transition_to(BeadState::Queued));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for from in BeadState::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(BeadState::Cancelled));
        }
    }

    #[test]
    fn test_state_parse() {
        assert_eq!("running".parse::<BeadState>().unwrap(), BeadState::Running);
        assert_eq!("Blocked".parse::<BeadState>().unwrap(), BeadState::Blocked);
        assert!("paused".parse::<BeadState>().is_err());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&BeadState::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_filter_matches() {
        let mut bead = Bead::new("t".to_string(), "standard".to_string(), 1, Utc::now());
        bead.agent_id = Some("agent-1".to_string());

        assert!(BeadFilter::default().matches(&bead));
        assert!(BeadFilter::default().with_lane("standard").matches(&bead));
        assert!(!BeadFilter::default().with_lane("critical").matches(&bead));
        assert!(BeadFilter::default().with_state(BeadState::Created).matches(&bead));
        assert!(!BeadFilter::default().with_state(BeadState::Queued).matches(&bead));
        assert!(BeadFilter::default().with_agent("agent-1").matches(&bead));
        assert!(!BeadFilter::default().with_agent("agent-2").matches(&bead));
    }
}
