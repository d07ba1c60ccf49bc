//! Credential refresh monitor.
//!
//! Re-resolves every tracked credential before its validity window runs
//! out. Failures are retried with exponential backoff and never stop the
//! loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beadline_config::{CredentialsConfig, TrackedCredential};
use beadline_core::{CredentialSource, CredentialStatus};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::TaskError;
use crate::task::BackgroundTask;

/// Refresh state of one tracked credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialHealth {
    pub name: String,
    pub env_var: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub next_attempt: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl CredentialHealth {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until > now)
    }
}

pub struct CredentialRefresher {
    source: Arc<dyn CredentialSource>,
    tracked: Vec<TrackedCredential>,
    interval: Duration,
    refresh_margin: Duration,
    backoff: Backoff,
    state: Mutex<HashMap<String, CredentialHealth>>,
}

impl CredentialRefresher {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        config: &CredentialsConfig,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            tracked: config.tracked.clone(),
            interval,
            refresh_margin: config.refresh_margin(),
            backoff: Backoff::new(config.backoff_initial(), config.backoff_max()),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh every credential that is due at `now`.
    pub fn refresh(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        for tracked in &self.tracked {
            let health = state
                .entry(tracked.name.clone())
                .or_insert_with(|| CredentialHealth {
                    name: tracked.name.clone(),
                    env_var: tracked.env_var.clone(),
                    valid_until: None,
                    consecutive_failures: 0,
                    next_attempt: now,
                    last_error: None,
                });
            if now < health.next_attempt {
                continue;
            }

            match self.source.resolve(&tracked.env_var) {
                CredentialStatus::Resolved(_) => {
                    let ttl = Duration::from_secs(tracked.ttl_secs);
                    let mut refresh_after = ttl.saturating_sub(self.refresh_margin);
                    if refresh_after.is_zero() {
                        refresh_after = ttl;
                    }
                    health.valid_until = Some(now + to_delta(ttl));
                    health.next_attempt = now + to_delta(refresh_after);
                    if health.consecutive_failures > 0 {
                        info!(credential = %tracked.name, env_var = %tracked.env_var, "Credential recovered");
                    } else {
                        debug!(credential = %tracked.name, "Credential refreshed");
                    }
                    health.consecutive_failures = 0;
                    health.last_error = None;
                }
                CredentialStatus::Missing(env_var) => {
                    let delay = self.backoff.next(health.consecutive_failures);
                    health.consecutive_failures += 1;
                    health.next_attempt = now + to_delta(delay);
                    health.last_error = Some(format!("{env_var} is not set"));
                    warn!(
                        credential = %tracked.name,
                        env_var = %env_var,
                        attempt = health.consecutive_failures,
                        retry_in = ?delay,
                        "Credential refresh failed"
                    );
                }
            }
        }
    }

    pub fn health(&self) -> Vec<CredentialHealth> {
        let mut health: Vec<_> = self.state.lock().values().cloned().collect();
        health.sort_by(|a, b| a.name.cmp(&b.name));
        health
    }
}

#[async_trait]
impl BackgroundTask for CredentialRefresher {
    fn name(&self) -> &str {
        "credentials"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.refresh(Utc::now());
        Ok(())
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
