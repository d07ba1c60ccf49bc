use super::*;
use crate::message::FanoutMessage;
use beadline_core::{BeadState, BeadStore};
use beadline_config::LaneConfig;
use chrono::Utc;
use std::time::Duration;

fn event(seq: u64, bead_id: Uuid, lane: &str, state: BeadState) -> BeadEvent {
    BeadEvent {
        seq,
        bead_id,
        lane: lane.to_string(),
        old_state: None,
        new_state: state,
        timestamp: Utc::now(),
    }
}

fn drain(subscription: &mut Subscription) -> Vec<FanoutMessage> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

#[test]
fn test_subscribe_and_drop() {
    let fanout = EventFanout::new(8);
    let a = fanout.subscribe(EventFilter::all());
    let b = fanout.subscribe(EventFilter::all());
    assert_eq!(fanout.subscriber_count(), 2);
    assert_ne!(a.id(), b.id());

    drop(a);
    assert_eq!(fanout.subscriber_count(), 1);
    drop(b);
    assert_eq!(fanout.subscriber_count(), 0);
}

#[test]
fn test_publish_order_preserved() {
    let fanout = EventFanout::new(16);
    let mut sub = fanout.subscribe(EventFilter::all());
    let id = Uuid::new_v4();
    for (seq, state) in [BeadState::Created, BeadState::Queued, BeadState::Running]
        .into_iter()
        .enumerate()
    {
        fanout.publish(&event(seq as u64, id, "standard", state));
    }

    let seqs: Vec<_> = drain(&mut sub)
        .iter()
        .filter_map(|m| m.as_event().map(|e| e.seq))
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(fanout.published(), 3);
}

#[test]
fn test_filters() {
    let fanout = EventFanout::new(16);
    let target = Uuid::new_v4();
    let mut by_lane = fanout.subscribe(EventFilter::lane("critical"));
    let mut by_bead = fanout.subscribe(EventFilter::bead(target));
    let mut by_state = fanout.subscribe(EventFilter::all().with_state(BeadState::Done));

    fanout.publish(&event(1, target, "standard", BeadState::Running));
    fanout.publish(&event(2, Uuid::new_v4(), "critical", BeadState::Done));
    fanout.publish(&event(3, target, "standard", BeadState::Done));

    let seqs = |msgs: Vec<FanoutMessage>| -> Vec<u64> {
        msgs.iter().filter_map(|m| m.as_event().map(|e| e.seq)).collect()
    };
    assert_eq!(seqs(drain(&mut by_lane)), vec![2]);
    assert_eq!(seqs(drain(&mut by_bead)), vec![1, 3]);
    assert_eq!(seqs(drain(&mut by_state)), vec![2, 3]);
}

#[test]
fn test_starved_subscriber_gets_single_gap() {
    let fanout = EventFanout::new(4);
    let mut starved = fanout.subscribe(EventFilter::all());
    let mut healthy = fanout.subscribe(EventFilter::all());
    let id = Uuid::new_v4();

    for seq in 0..10 {
        fanout.publish(&event(seq, id, "standard", BeadState::Running));
        // The healthy subscriber keeps up.
        assert!(healthy.try_recv().is_some());
    }

    let messages = drain(&mut starved);
    assert_eq!(messages[0], FanoutMessage::Gap { dropped: 6 });
    assert_eq!(messages.iter().filter(|m| m.is_gap()).count(), 1);
    let seqs: Vec<_> = messages
        .iter()
        .filter_map(|m| m.as_event().map(|e| e.seq))
        .collect();
    assert_eq!(seqs, vec![6, 7, 8, 9]);

    assert!(healthy.try_recv().is_none());
    let stats = fanout.stats();
    assert_eq!(stats.iter().map(|s| s.dropped_total).sum::<u64>(), 6);
}

#[test]
fn test_close_drains_then_ends() {
    let fanout = EventFanout::new(8);
    let mut sub = fanout.subscribe(EventFilter::all());
    fanout.publish(&event(1, Uuid::new_v4(), "standard", BeadState::Queued));

    fanout.close();
    fanout.close();
    assert!(fanout.is_closed());
    assert_eq!(fanout.subscriber_count(), 0);

    fanout.publish(&event(2, Uuid::new_v4(), "standard", BeadState::Queued));
    assert!(matches!(sub.try_recv(), Some(FanoutMessage::Event(e)) if e.seq == 1));
    assert!(sub.try_recv().is_none());
    assert!(sub.is_closed());
}

#[test]
fn test_subscribe_after_close_is_ended() {
    let fanout = EventFanout::new(8);
    fanout.close();
    let sub = fanout.subscribe(EventFilter::all());
    assert!(sub.is_closed());
    assert_eq!(fanout.subscriber_count(), 0);
}

#[tokio::test]
async fn test_recv_wakes_on_publish() {
    let fanout = EventFanout::new(8);
    let mut sub = fanout.subscribe(EventFilter::all());

    let reader = tokio::spawn(async move { sub.recv().await });
    tokio::task::yield_now().await;
    fanout.publish(&event(7, Uuid::new_v4(), "standard", BeadState::Done));

    let received = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(received, Some(FanoutMessage::Event(e)) if e.seq == 7));
}

#[tokio::test]
async fn test_recv_ends_on_close() {
    let fanout = EventFanout::new(8);
    let mut sub = fanout.subscribe(EventFilter::all());

    let reader = tokio::spawn(async move { sub.recv().await });
    tokio::task::yield_now().await;
    fanout.close();

    let received = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .unwrap()
        .unwrap();
    assert!(received.is_none());
}

#[test]
fn test_store_transitions_reach_subscribers() {
    let store = BeadStore::new(&[LaneConfig::new("critical", 1)]);
    let fanout = EventFanout::new(32);
    store.add_sink(Arc::new(fanout.clone()));
    let mut sub = fanout.subscribe(EventFilter::lane("critical"));

    let bead = store.create("deploy", "critical").unwrap();
    store.transition(bead.id, BeadState::Done).unwrap();

    let states: Vec<_> = drain(&mut sub)
        .iter()
        .filter_map(|m| m.as_event().map(|e| (e.old_state, e.new_state)))
        .collect();
    assert_eq!(
        states,
        vec![
            (None, BeadState::Created),
            (Some(BeadState::Created), BeadState::Queued),
            (Some(BeadState::Queued), BeadState::Running),
            (Some(BeadState::Running), BeadState::Done),
        ]
    );
}
