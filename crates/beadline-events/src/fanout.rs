use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use beadline_config::FanoutConfig;
use beadline_core::{BeadEvent, EventSink};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::filter::EventFilter;
use crate::subscription::{Push, Subscriber, SubscriberQueue, Subscription};

#[derive(Debug)]
pub(crate) struct FanoutShared {
    subscribers: DashMap<Uuid, Arc<Subscriber>>,
    high_water_mark: usize,
    closed: AtomicBool,
    published: AtomicU64,
}

impl FanoutShared {
    pub(crate) fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber_id = %id, "Subscriber removed");
        }
    }
}

/// Per-subscriber counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub id: Uuid,
    pub buffered: usize,
    pub dropped_total: u64,
}

/// Fan-out of bead events to subscribers with bounded buffers.
#[derive(Debug, Clone)]
pub struct EventFanout {
    shared: Arc<FanoutShared>,
}

impl EventFanout {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            shared: Arc::new(FanoutShared {
                subscribers: DashMap::new(),
                high_water_mark: high_water_mark.max(1),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &FanoutConfig) -> Self {
        Self::new(config.high_water_mark)
    }

    /// Register a subscriber. After [`close`](Self::close) the returned
    /// subscription is already at end-of-stream.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = Uuid::new_v4();
        let subscriber = Arc::new(Subscriber {
            filter,
            queue: SubscriberQueue::new(self.shared.high_water_mark),
        });

        self.shared.subscribers.insert(id, subscriber.clone());
        // A concurrent close may have missed the insert.
        if self.shared.closed.load(Ordering::SeqCst) {
            subscriber.queue.close();
            self.shared.subscribers.remove(&id);
        } else {
            debug!(subscriber_id = %id, "Subscriber added");
        }
        Subscription::new(id, subscriber, Arc::downgrade(&self.shared))
    }

    /// Stop accepting events. Subscribers drain what they hold, then see end-of-stream.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let count = self.shared.subscribers.len();
        for entry in self.shared.subscribers.iter() {
            entry.value().queue.close();
        }
        self.shared.subscribers.clear();
        info!(subscribers = count, "Event fan-out closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Vec<SubscriberStats> {
        let mut stats: Vec<_> = self
            .shared
            .subscribers
            .iter()
            .map(|entry| SubscriberStats {
                id: *entry.key(),
                buffered: entry.value().queue.buffered(),
                dropped_total: entry.value().queue.dropped_total(),
            })
            .collect();
        stats.sort_by_key(|s| s.id);
        stats
    }
}

impl EventSink for EventFanout {
    fn publish(&self, event: &BeadEvent) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        for entry in self.shared.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.filter.matches(event) {
                continue;
            }
            if let Push::Overflowed { gap_opened: true } = subscriber.queue.push(event.clone()) {
                warn!(
                    subscriber_id = %entry.key(),
                    high_water_mark = self.shared.high_water_mark,
                    "Subscriber lagging, dropping oldest events"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
