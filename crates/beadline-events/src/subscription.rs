use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use beadline_core::BeadEvent;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::fanout::FanoutShared;
use crate::filter::EventFilter;
use crate::message::FanoutMessage;

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<BeadEvent>,
    /// Events dropped since the last gap marker was delivered.
    pending_gap: u64,
    dropped_total: u64,
    closed: bool,
}

/// Outcome of pushing into a subscriber buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    Buffered,
    /// Oldest event dropped; `gap_opened` is true on the first drop since the last gap delivery.
    Overflowed { gap_opened: bool },
    Closed,
}

/// Bounded single-consumer buffer.
#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&self, event: BeadEvent) -> Push {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return Push::Closed;
            }
            let outcome = if state.events.len() >= self.capacity {
                state.events.pop_front();
                let gap_opened = state.pending_gap == 0;
                state.pending_gap += 1;
                state.dropped_total += 1;
                Push::Overflowed { gap_opened }
            } else {
                Push::Buffered
            };
            state.events.push_back(event);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Option<FanoutMessage>> {
        let mut state = self.state.lock();
        if state.pending_gap > 0 {
            let dropped = std::mem::take(&mut state.pending_gap);
            return Some(Some(FanoutMessage::Gap { dropped }));
        }
        if let Some(event) = state.events.pop_front() {
            return Some(Some(FanoutMessage::Event(event)));
        }
        if state.closed {
            return Some(None);
        }
        None
    }

    pub(crate) fn buffered(&self) -> usize {
        self.state.lock().events.len()
    }

    pub(crate) fn dropped_total(&self) -> u64 {
        self.state.lock().dropped_total
    }
}

#[derive(Debug)]
pub(crate) struct Subscriber {
    pub(crate) filter: EventFilter,
    pub(crate) queue: SubscriberQueue,
}

/// Handle held by one observer. Dropping it unregisters the subscriber and
/// frees its buffer.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    subscriber: Arc<Subscriber>,
    fanout: Weak<FanoutShared>,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, subscriber: Arc<Subscriber>, fanout: Weak<FanoutShared>) -> Self {
        Self {
            id,
            subscriber,
            fanout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.subscriber.filter
    }

    /// Next message, waiting if the buffer is empty.
    ///
    /// Returns `None` once the fan-out is closed and the buffer is drained.
    pub async fn recv(&mut self) -> Option<FanoutMessage> {
        loop {
            if let Some(next) = self.subscriber.queue.pop() {
                return next;
            }
            self.subscriber.queue.notify.notified().await;
        }
    }

    /// Next message without waiting. `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<FanoutMessage> {
        self.subscriber.queue.pop().flatten()
    }

    /// Whether the stream has ended.
    pub fn is_closed(&self) -> bool {
        let state = self.subscriber.queue.state.lock();
        state.closed && state.events.is_empty() && state.pending_gap == 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.upgrade() {
            fanout.unsubscribe(self.id);
        }
    }
}
