use super::*;
use crate::credential::StaticCredentials;
use std::collections::HashMap;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<BeadEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<BeadEvent> {
        self.events.lock().clone()
    }

    fn states_for(&self, id: BeadId) -> Vec<BeadState> {
        self.events()
            .into_iter()
            .filter(|e| e.bead_id == id)
            .map(|e| e.new_state)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &BeadEvent) {
        self.events.lock().push(event.clone());
    }
}

fn lanes() -> Vec<LaneConfig> {
    vec![
        LaneConfig::new("critical", 1),
        LaneConfig::new("standard", 2),
    ]
}

fn store_with_sink() -> (BeadStore, Arc<RecordingSink>) {
    let store = BeadStore::new(&lanes());
    let sink = Arc::new(RecordingSink::default());
    store.add_sink(sink.clone());
    (store, sink)
}

#[test]
fn test_create_admits_when_permit_free() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("build", "standard").unwrap();

    assert_eq!(bead.state, BeadState::Running);
    assert!(bead.permit_id.is_some());
    assert_eq!(bead.lane, "standard");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_create_unknown_lane() {
    let store = BeadStore::new(&lanes());
    let result = store.create("build", "nope");
    assert!(matches!(result, Err(CoreError::UnknownLane(lane)) if lane == "nope"));
    assert!(store.is_empty());
}

#[test]
fn test_create_empty_title() {
    let store = BeadStore::new(&lanes());
    assert!(matches!(
        store.create("   ", "standard"),
        Err(CoreError::InvalidInput(_))
    ));
}

#[test]
fn test_scenario_single_permit_handoff() {
    let store = BeadStore::new(&lanes());
    let b1 = store.create("first", "critical").unwrap();
    let b2 = store.create("second", "critical").unwrap();
    assert_eq!(b1.state, BeadState::Running);
    assert_eq!(b2.state, BeadState::Queued);

    let status = store.lane_status("critical").unwrap();
    assert_eq!(status.running, 1);
    assert_eq!(status.waiting, 1);
    assert_eq!(status.permits_available, 0);

    let done = store.transition(b1.id, BeadState::Done).unwrap();
    assert_eq!(done.state, BeadState::Done);
    assert!(done.permit_id.is_none());

    let b2 = store.get(b2.id).unwrap();
    assert_eq!(b2.state, BeadState::Running);
    assert!(b2.permit_id.is_some());
}

#[test]
fn test_fifo_within_lane() {
    let store = BeadStore::new(&lanes());
    let running = store.create("holder", "critical").unwrap();
    let waiting: Vec<_> = (0..5)
        .map(|i| store.create(&format!("w{i}"), "critical").unwrap())
        .collect();

    let mut order = Vec::new();
    let mut current = running.id;
    for _ in 0..waiting.len() {
        store.transition(current, BeadState::Done).unwrap();
        let next = store
            .list(&BeadFilter::default().with_lane("critical").with_state(BeadState::Running))
            .pop()
            .unwrap();
        order.push(next.id);
        current = next.id;
    }

    let expected: Vec<_> = waiting.iter().map(|b| b.id).collect();
    assert_eq!(order, expected);
}

#[test]
fn test_lanes_are_independent() {
    let store = BeadStore::new(&lanes());
    store.create("c1", "critical").unwrap();
    let c2 = store.create("c2", "critical").unwrap();
    let s1 = store.create("s1", "standard").unwrap();

    assert_eq!(c2.state, BeadState::Queued);
    assert_eq!(s1.state, BeadState::Running);
}

#[test]
fn test_invalid_transition_leaves_state_unchanged() {
    let (store, sink) = store_with_sink();
    let bead = store.create("b", "standard").unwrap();
    store.transition(bead.id, BeadState::Done).unwrap();
    let events_before = sink.events().len();

    let result = store.transition(bead.id, BeadState::Running);
    assert!(matches!(
        result,
        Err(CoreError::InvalidTransition {
            from: BeadState::Done,
            to: BeadState::Running,
            ..
        })
    ));
    assert_eq!(store.get(bead.id).unwrap().state, BeadState::Done);
    assert_eq!(sink.events().len(), events_before);
}

#[test]
fn test_no_second_terminal_state() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "standard").unwrap();
    store.fail(bead.id, "boom").unwrap();

    assert!(store.transition(bead.id, BeadState::Done).is_err());
    assert!(store.cancel(bead.id).is_err());
    let bead = store.get(bead.id).unwrap();
    assert_eq!(bead.state, BeadState::Failed);
    assert_eq!(bead.last_error.as_deref(), Some("boom"));
}

#[test]
fn test_cancel_from_every_non_terminal_state() {
    let store = BeadStore::new(&lanes());

    let created = store.create_held("held", "standard").unwrap();
    assert_eq!(created.state, BeadState::Created);
    assert_eq!(store.cancel(created.id).unwrap().state, BeadState::Cancelled);

    let running = store.create("r", "critical").unwrap();
    let queued = store.create("q", "critical").unwrap();
    assert_eq!(queued.state, BeadState::Queued);
    assert_eq!(store.cancel(queued.id).unwrap().state, BeadState::Cancelled);
    assert_eq!(store.lane_status("critical").unwrap().waiting, 0);

    store.block(running.id, "waiting on input").unwrap();
    assert_eq!(store.cancel(running.id).unwrap().state, BeadState::Cancelled);
    assert_eq!(store.lane_status("critical").unwrap().permits_available, 1);
}

#[test]
fn test_cancel_is_idempotent() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "standard").unwrap();
    let first = store.cancel(bead.id).unwrap();
    let second = store.cancel(bead.id).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cancelled_waiter_is_skipped() {
    let store = BeadStore::new(&lanes());
    let holder = store.create("holder", "critical").unwrap();
    let skipped = store.create("skipped", "critical").unwrap();
    let next = store.create("next", "critical").unwrap();

    store.cancel(skipped.id).unwrap();
    store.transition(holder.id, BeadState::Done).unwrap();

    assert_eq!(store.get(next.id).unwrap().state, BeadState::Running);
}

#[test]
fn test_create_held_then_queue() {
    let store = BeadStore::new(&lanes());
    let bead = store.create_held("later", "standard").unwrap();
    assert_eq!(store.lane_status("standard").unwrap().waiting, 0);

    let bead = store.transition(bead.id, BeadState::Queued).unwrap();
    assert_eq!(bead.state, BeadState::Running);
}

#[test]
fn test_held_bead_keeps_creation_order() {
    let store = BeadStore::new(&lanes());
    let held = store.create_held("held", "critical").unwrap();
    let holder = store.create("holder", "critical").unwrap();
    let waiter = store.create("waiter", "critical").unwrap();

    // Held was created first, so it takes the head of the queue once queued.
    let held = store.transition(held.id, BeadState::Queued).unwrap();
    assert_eq!(held.state, BeadState::Queued);
    store.transition(holder.id, BeadState::Done).unwrap();

    assert_eq!(store.get(held.id).unwrap().state, BeadState::Running);
    assert_eq!(store.get(waiter.id).unwrap().state, BeadState::Queued);
}

#[test]
fn test_requesting_running_defers_when_exhausted() {
    let store = BeadStore::new(&lanes());
    store.create("holder", "critical").unwrap();
    let waiting = store.create("waiting", "critical").unwrap();

    let bead = store.transition(waiting.id, BeadState::Running).unwrap();
    assert_eq!(bead.state, BeadState::Queued);
}

#[test]
fn test_blocked_keeps_permit_and_counts_retry() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "critical").unwrap();
    let permit = bead.permit_id;

    let blocked = store.block(bead.id, "needs review").unwrap();
    assert_eq!(blocked.state, BeadState::Blocked);
    assert_eq!(blocked.permit_id, permit);
    assert_eq!(blocked.blocked_on.as_deref(), Some("needs review"));
    let status = store.lane_status("critical").unwrap();
    assert_eq!(status.permits_available, 0);
    assert_eq!(status.permits_held, 1);
    assert_eq!(status.running, 0);

    let resumed = store.transition(bead.id, BeadState::Running).unwrap();
    assert_eq!(resumed.retry_count, 1);
    assert_eq!(resumed.permit_id, permit);
    assert!(resumed.blocked_on.is_none());
}

#[test]
fn test_blocked_to_failed_releases_permit() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "critical").unwrap();
    let next = store.create("next", "critical").unwrap();
    store.block(bead.id, "stuck").unwrap();

    store.transition(bead.id, BeadState::Failed).unwrap();
    assert_eq!(store.get(next.id).unwrap().state, BeadState::Running);
}

#[test]
fn test_missing_credential_blocks_then_resumes() {
    let store = BeadStore::new(&lanes());
    let source = StaticCredentials::new();
    let bead = store.create("deploy", "standard").unwrap();

    let err = store
        .require_credential(bead.id, &source, "DEPLOY_TOKEN")
        .unwrap_err();
    match err {
        CoreError::MissingCredential { env_var, hint, .. } => {
            assert_eq!(env_var, "DEPLOY_TOKEN");
            assert!(hint.contains("DEPLOY_TOKEN"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let blocked = store.get(bead.id).unwrap();
    assert_eq!(blocked.state, BeadState::Blocked);
    assert!(blocked.blocked_on.unwrap().contains("DEPLOY_TOKEN"));

    // Still missing: stays blocked, same error.
    assert!(store.require_credential(bead.id, &source, "DEPLOY_TOKEN").is_err());
    assert_eq!(store.get(bead.id).unwrap().state, BeadState::Blocked);

    source.set("DEPLOY_TOKEN", "t0k3n");
    let credential = store
        .require_credential(bead.id, &source, "DEPLOY_TOKEN")
        .unwrap();
    assert_eq!(credential.expose(), "t0k3n");
    let resumed = store.get(bead.id).unwrap();
    assert_eq!(resumed.state, BeadState::Running);
    assert_eq!(resumed.retry_count, 1);
}

#[test]
fn test_credential_on_queued_bead_is_invalid() {
    let store = BeadStore::new(&lanes());
    store.create("holder", "critical").unwrap();
    let queued = store.create("queued", "critical").unwrap();
    let source = StaticCredentials::new();

    let result = store.require_credential(queued.id, &source, "TOKEN");
    assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
    assert_eq!(store.get(queued.id).unwrap().state, BeadState::Queued);
}

#[test]
fn test_bind_agent() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "standard").unwrap();

    let bound = store.bind_agent(bead.id, "agent-7").unwrap();
    assert_eq!(bound.agent_id.as_deref(), Some("agent-7"));
    assert!(store.agents().get("agent-7").is_some());

    let listed = store.list(&BeadFilter::default().with_agent("agent-7"));
    assert_eq!(listed.len(), 1);

    store.transition(bead.id, BeadState::Done).unwrap();
    assert!(matches!(
        store.bind_agent(bead.id, "agent-8"),
        Err(CoreError::InvalidInput(_))
    ));
}

#[test]
fn test_fail_if_rechecks_predicate() {
    let store = BeadStore::new(&lanes());
    let bead = store.create("b", "standard").unwrap();

    let skipped = store.fail_if(bead.id, "stuck", |_| false).unwrap();
    assert!(skipped.is_none());

    let failed = store
        .fail_if(bead.id, "stuck", |b| b.state == BeadState::Running)
        .unwrap()
        .unwrap();
    assert_eq!(failed.state, BeadState::Failed);

    // Already terminal: nothing to do.
    assert!(store.fail_if(bead.id, "stuck", |_| true).unwrap().is_none());
}

#[test]
fn test_get_unknown_bead() {
    let store = BeadStore::new(&lanes());
    let id = uuid::Uuid::new_v4();
    assert!(matches!(store.get(id), Err(CoreError::BeadNotFound(missing)) if missing == id));
    assert!(matches!(store.cancel(id), Err(CoreError::BeadNotFound(_))));
}

#[test]
fn test_set_lane_budget_admits_waiters() {
    let store = BeadStore::new(&lanes());
    store.create("a", "critical").unwrap();
    let b = store.create("b", "critical").unwrap();
    let c = store.create("c", "critical").unwrap();

    let status = store.set_lane_budget("critical", 3).unwrap();
    assert_eq!(status.budget, 3);
    assert_eq!(status.running, 3);
    assert_eq!(store.get(b.id).unwrap().state, BeadState::Running);
    assert_eq!(store.get(c.id).unwrap().state, BeadState::Running);
}

#[test]
fn test_set_lane_budget_adds_lane() {
    let store = BeadStore::new(&lanes());
    store.set_lane_budget("experimental", 1).unwrap();
    assert!(store.lane_names().contains(&"experimental".to_string()));
    assert_eq!(
        store.create("x", "experimental").unwrap().state,
        BeadState::Running
    );
}

#[test]
fn test_set_lane_budget_rejects_zero() {
    let store = BeadStore::new(&lanes());
    assert!(matches!(
        store.set_lane_budget("critical", 0),
        Err(CoreError::InvalidBudget { .. })
    ));
}

#[test]
fn test_shrinking_budget_does_not_preempt() {
    let store = BeadStore::new(&lanes());
    let a = store.create("a", "standard").unwrap();
    store.create("b", "standard").unwrap();
    let c = store.create("c", "standard").unwrap();

    store.set_lane_budget("standard", 1).unwrap();
    store.transition(a.id, BeadState::Done).unwrap();
    // One still running at budget 1: the waiter must not be admitted.
    assert_eq!(store.get(c.id).unwrap().state, BeadState::Queued);
}

#[test]
fn test_events_follow_commit_order() {
    let (store, sink) = store_with_sink();
    let bead = store.create("b", "standard").unwrap();
    store.block(bead.id, "x").unwrap();
    store.transition(bead.id, BeadState::Running).unwrap();
    store.transition(bead.id, BeadState::Done).unwrap();

    assert_eq!(
        sink.states_for(bead.id),
        vec![
            BeadState::Created,
            BeadState::Queued,
            BeadState::Running,
            BeadState::Blocked,
            BeadState::Running,
            BeadState::Done,
        ]
    );

    let events = sink.events();
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(events[0].old_state, None);
    assert_eq!(events[1].old_state, Some(BeadState::Created));
}

#[test]
fn test_release_event_precedes_admission_event() {
    let (store, sink) = store_with_sink();
    let a = store.create("a", "critical").unwrap();
    let b = store.create("b", "critical").unwrap();
    store.transition(a.id, BeadState::Done).unwrap();

    let tail: Vec<_> = sink
        .events()
        .into_iter()
        .rev()
        .take(2)
        .map(|e| (e.bead_id, e.new_state))
        .collect();
    assert_eq!(
        tail,
        vec![(b.id, BeadState::Running), (a.id, BeadState::Done)]
    );
}

#[test]
fn test_list_filters_and_orders() {
    let store = BeadStore::new(&lanes());
    let a = store.create("a", "standard").unwrap();
    let b = store.create("b", "critical").unwrap();
    let c = store.create("c", "standard").unwrap();
    store.transition(c.id, BeadState::Done).unwrap();

    let all: Vec<_> = store.list(&BeadFilter::default()).into_iter().map(|b| b.id).collect();
    assert_eq!(all, vec![a.id, b.id, c.id]);

    let standard = store.list(&BeadFilter::default().with_lane("standard"));
    assert_eq!(standard.len(), 2);

    let done = store.list(&BeadFilter::default().with_state(BeadState::Done));
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, c.id);

    assert!(store.list(&BeadFilter::default().with_lane("unknown")).is_empty());
}

#[test]
fn test_evict_terminal() {
    let store = BeadStore::new(&lanes());
    let done = store.create("done", "standard").unwrap();
    let live = store.create("live", "standard").unwrap();
    store.transition(done.id, BeadState::Done).unwrap();

    assert_eq!(store.evict_terminal(Utc::now() - chrono::TimeDelta::hours(1)), 0);
    assert_eq!(store.evict_terminal(Utc::now() + chrono::TimeDelta::seconds(1)), 1);

    assert!(matches!(store.get(done.id), Err(CoreError::BeadNotFound(_))));
    assert!(store.get(live.id).is_ok());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_kpi_snapshot_counts() {
    let store = BeadStore::new(&lanes());
    store.create("a", "critical").unwrap();
    store.create("b", "critical").unwrap();
    let c = store.create("c", "standard").unwrap();
    store.transition(c.id, BeadState::Done).unwrap();
    store.agents().heartbeat("agent-1");

    let snapshot = store.kpi_snapshot(Duration::from_secs(60));
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.count(BeadState::Running), 1);
    assert_eq!(snapshot.count(BeadState::Queued), 1);
    assert_eq!(snapshot.count(BeadState::Done), 1);
    assert_eq!(snapshot.counts_by_lane["critical"], 2);
    assert_eq!(snapshot.counts_by_lane["standard"], 1);
    assert_eq!(snapshot.active_agents, 1);
}

#[test]
fn test_concurrent_mutations_preserve_invariants() {
    let store = Arc::new(BeadStore::new(&[
        LaneConfig::new("critical", 1),
        LaneConfig::new("standard", 3),
    ]));
    let sink = Arc::new(RecordingSink::default());
    store.add_sink(sink.clone());

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let store = store.clone();
            scope.spawn(move || {
                let lane = if worker % 2 == 0 { "critical" } else { "standard" };
                for i in 0..50 {
                    let bead = store.create(&format!("w{worker}-{i}"), lane).unwrap();
                    let _ = match i % 3 {
                        0 => store.cancel(bead.id),
                        1 => store.transition(bead.id, BeadState::Done),
                        _ => store.fail(bead.id, "synthetic"),
                    };
                    for status in store.status() {
                        assert!(status.running + status.blocked <= status.budget);
                    }
                }
            });
        }
    });

    // Drain: finish whatever is still running until nothing is left in flight.
    loop {
        let running = store.list(&BeadFilter::default().with_state(BeadState::Running));
        if running.is_empty() {
            break;
        }
        for bead in running {
            let _ = store.transition(bead.id, BeadState::Done);
        }
    }

    for status in store.status() {
        assert_eq!(status.waiting, 0);
        assert_eq!(status.running, 0);
        assert_eq!(status.permits_acquired, status.permits_released);
    }

    let mut walks: HashMap<BeadId, Vec<BeadEvent>> = HashMap::new();
    for event in sink.events() {
        walks.entry(event.bead_id).or_default().push(event);
    }
    assert_eq!(walks.len(), 400);
    for events in walks.values() {
        assert_eq!(events[0].old_state, None);
        for pair in events.windows(2) {
            assert_eq!(pair[1].old_state, Some(pair[0].new_state));
            assert!(pair[0].new_state.can_transition_to(pair[1].new_state));
            assert!(pair[0].seq < pair[1].seq);
        }
        let terminals = events.iter().filter(|e| e.new_state.is_terminal()).count();
        assert_eq!(terminals, 1);
    }
}
