//! Notification outbox and sinks.
//!
//! The store publishes into a bounded [`NotificationOutbox`] on the mutation
//! path; the [`NotificationDispatcher`] background task drains it in batches
//! to every configured [`NotificationSink`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beadline_core::{BeadEvent, EventSink};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::task::BackgroundTask;

/// Bounded queue of events awaiting external delivery. Full outbox drops the oldest.
#[derive(Debug)]
pub struct NotificationOutbox {
    capacity: usize,
    queue: Mutex<VecDeque<BeadEvent>>,
    dropped: AtomicU64,
}

impl NotificationOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Take up to `max` events, oldest first.
    pub fn drain(&self, max: usize) -> Vec<BeadEvent> {
        let mut queue = self.queue.lock();
        let count = max.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Events lost to overflow since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for NotificationOutbox {
    fn publish(&self, event: &BeadEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event.clone());
    }
}

/// Destination for batches of bead events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, batch: &[BeadEvent]) -> Result<(), TaskError>;
}

/// Writes each event to the tracing log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, batch: &[BeadEvent]) -> Result<(), TaskError> {
        for event in batch {
            info!(
                bead_id = %event.bead_id,
                lane = %event.lane,
                from = ?event.old_state,
                to = %event.new_state,
                "Bead state changed"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    events: &'a [BeadEvent],
}

/// POSTs each batch as JSON (`{"events": [...]}`) to a webhook URL.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TaskError> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| TaskError::Notification(format!("invalid webhook url {url:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskError::Notification(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, batch: &[BeadEvent]) -> Result<(), TaskError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { events: batch })
            .send()
            .await
            .map_err(|e| TaskError::Notification(format!("webhook request failed: {e}")))?;

        if response.status().is_success() {
            debug!(events = batch.len(), "Webhook batch delivered");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TaskError::Notification(format!(
                "webhook returned {status}: {body}"
            )))
        }
    }
}

/// Drains the outbox to every sink, one batch at a time.
pub struct NotificationDispatcher {
    outbox: Arc<NotificationOutbox>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    batch_size: usize,
    interval: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        outbox: Arc<NotificationOutbox>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            outbox,
            sinks,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// Drain everything queued at call time. A failing sink loses the batch
    /// for that sink only; the first failure is returned after the drain.
    pub async fn dispatch(&self) -> Result<usize, TaskError> {
        let mut remaining = self.outbox.len();
        let mut delivered = 0;
        let mut first_error = None;

        while remaining > 0 {
            let batch = self.outbox.drain(self.batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining -= batch.len();
            for sink in &self.sinks {
                if let Err(e) = sink.send(&batch).await {
                    warn!(sink = sink.name(), events = batch.len(), error = %e, "Notification batch not delivered");
                    first_error.get_or_insert(e);
                }
            }
            delivered += batch.len();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }
}

#[async_trait]
impl BackgroundTask for NotificationDispatcher {
    fn name(&self) -> &str {
        "notifications"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) -> Result<(), TaskError> {
        self.dispatch().await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
