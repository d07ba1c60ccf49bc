//! Core errors.

use thiserror::Error;

use crate::bead::{BeadId, BeadState};

/// Errors surfaced synchronously to callers of the bead store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No bead with this id is tracked (never created, or already evicted).
    #[error("Bead not found: {0}")]
    BeadNotFound(BeadId),

    /// The lane is not configured.
    #[error("Unknown lane: {0}")]
    UnknownLane(String),

    /// The requested state change is not an edge of the bead graph.
    #[error("Invalid transition for bead {bead_id}: {from} -> {to}")]
    InvalidTransition {
        bead_id: BeadId,
        from: BeadState,
        to: BeadState,
    },

    /// A credential needed by the bead is not available; the bead is parked in `Blocked`.
    #[error("Missing credential for bead {bead_id}: {env_var} is not set ({hint})")]
    MissingCredential {
        bead_id: BeadId,
        env_var: String,
        hint: String,
    },

    /// Lane budget rejected.
    #[error("Invalid budget for lane {lane}: {reason}")]
    InvalidBudget { lane: String, reason: String },

    /// Malformed caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Whether the error is caused by the caller rather than the environment.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, CoreError::MissingCredential { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_invalid_transition_display() {
        let err = CoreError::InvalidTransition {
            bead_id: Uuid::nil(),
            from: BeadState::Done,
            to: BeadState::Running,
        };
        let display = err.to_string();
        assert!(display.contains("done -> running"));
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let err = CoreError::MissingCredential {
            bead_id: Uuid::nil(),
            env_var: "GITHUB_TOKEN".to_string(),
            hint: "export GITHUB_TOKEN and retry".to_string(),
        };
        assert!(err.to_string().contains("GITHUB_TOKEN"));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_caller_errors() {
        assert!(CoreError::UnknownLane("x".to_string()).is_caller_error());
        assert!(CoreError::BeadNotFound(Uuid::nil()).is_caller_error());
    }
}
