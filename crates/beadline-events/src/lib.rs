//! Event fan-out for Beadline.
//!
//! The bead store pushes every committed transition into [`EventFanout`],
//! which copies it into the bounded buffer of each matching subscriber.
//! Publishing never blocks: a full buffer drops its oldest events and the
//! subscriber receives a single gap marker in their place.

mod fanout;
mod filter;
mod message;
mod subscription;

pub use fanout::{EventFanout, SubscriberStats};
pub use filter::EventFilter;
pub use message::FanoutMessage;
pub use subscription::Subscription;
