//! Background task contract and descriptors.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// A periodic maintenance task driven by the supervisor.
///
/// `tick` may be dropped at any await point when shutdown is triggered.
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn tick(&self) -> Result<(), TaskError>;
}

/// Result of the most recent tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TaskOutcome {
    Never,
    Ok,
    Error(String),
    Panicked(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Error(_) | TaskOutcome::Panicked(_))
    }
}

/// Bookkeeping for one background task, kept for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub interval_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: TaskOutcome,
    pub runs: u64,
    pub failures: u64,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval_ms: interval.as_millis() as u64,
            last_run: None,
            last_outcome: TaskOutcome::Never,
            runs: 0,
            failures: 0,
        }
    }

    pub(crate) fn record(&mut self, at: DateTime<Utc>, outcome: TaskOutcome) {
        self.last_run = Some(at);
        self.runs += 1;
        if outcome.is_failure() {
            self.failures += 1;
        }
        self.last_outcome = outcome;
    }
}
