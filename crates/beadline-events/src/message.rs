use beadline_core::BeadEvent;
use serde::{Deserialize, Serialize};

/// Item delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutMessage {
    Event(BeadEvent),
    /// Stands in for `dropped` events lost to backpressure.
    Gap { dropped: u64 },
}

impl FanoutMessage {
    pub fn as_event(&self) -> Option<&BeadEvent> {
        match self {
            FanoutMessage::Event(event) => Some(event),
            FanoutMessage::Gap { .. } => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, FanoutMessage::Gap { .. })
    }
}
