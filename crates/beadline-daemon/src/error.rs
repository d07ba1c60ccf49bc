//! Daemon-related errors.

use beadline_config::ConfigError;
use beadline_core::CoreError;
use thiserror::Error;

use crate::daemon::DaemonState;

/// Errors from assembling or driving the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// Invalid daemon state transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: DaemonState, to: DaemonState },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single background tick. Never fatal to the loop.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
