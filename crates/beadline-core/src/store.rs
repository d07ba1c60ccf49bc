//! Authoritative bead store.
//!
//! Each lane owns one mutex around its bead records, its waiting set and its
//! permit accounting. Every transition and every permit acquire/release for a
//! bead happens under that bead's lane lock; the id index only routes lookups.
//! Sinks are invoked under the lane lock, so events for one bead are
//! published in commit order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use beadline_config::LaneConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::admission::{self, LaneStatus};
use crate::agent::AgentRegistry;
use crate::bead::{Bead, BeadFilter, BeadId, BeadState};
use crate::credential::{Credential, CredentialSource, CredentialStatus, remediation_hint};
use crate::error::CoreError;
use crate::event::{BeadEvent, EventSink};
use crate::kpi::KpiSnapshot;
use crate::lane::{BeadRecord, LaneState};

type LaneHandle = Arc<Mutex<LaneState>>;

pub struct BeadStore {
    lanes: RwLock<BTreeMap<String, LaneHandle>>,
    index: DashMap<BeadId, String>,
    agents: Arc<AgentRegistry>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    next_bead_seq: AtomicU64,
    next_event_seq: AtomicU64,
}

impl BeadStore {
    pub fn new(lanes: &[LaneConfig]) -> Self {
        Self::with_agents(lanes, Arc::new(AgentRegistry::new()))
    }

    pub fn with_agents(lanes: &[LaneConfig], agents: Arc<AgentRegistry>) -> Self {
        let lanes = lanes
            .iter()
            .map(|lane| {
                (
                    lane.name.clone(),
                    Arc::new(Mutex::new(LaneState::new(&lane.name, lane.budget))),
                )
            })
            .collect();

        Self {
            lanes: RwLock::new(lanes),
            index: DashMap::new(),
            agents,
            sinks: RwLock::new(Vec::new()),
            next_bead_seq: AtomicU64::new(0),
            next_event_seq: AtomicU64::new(0),
        }
    }

    /// Register a sink for committed transitions.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn lane_names(&self) -> Vec<String> {
        self.lanes.read().keys().cloned().collect()
    }

    /// Number of tracked beads, terminal ones included until evicted.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Create a bead and queue it for admission.
    pub fn create(&self, title: &str, lane: &str) -> Result<Bead, CoreError> {
        self.insert(title, lane, true)
    }

    /// Create a bead that stays in `Created` until explicitly queued.
    pub fn create_held(&self, title: &str, lane: &str) -> Result<Bead, CoreError> {
        self.insert(title, lane, false)
    }

    pub fn get(&self, id: BeadId) -> Result<Bead, CoreError> {
        self.with_lane_of(id, |lane, _| {
            lane.beads
                .get(&id)
                .map(|record| record.bead.clone())
                .ok_or(CoreError::BeadNotFound(id))
        })
    }

    /// Request a state change.
    ///
    /// `Queued -> Running` is owned by admission: requesting it re-evaluates
    /// the lane and returns the bead as it stands afterwards.
    pub fn transition(&self, id: BeadId, target: BeadState) -> Result<Bead, CoreError> {
        let reason = match target {
            BeadState::Failed => Some("failed by request".to_string()),
            BeadState::Blocked => Some("blocked by request".to_string()),
            _ => None,
        };
        self.with_lane_of(id, |lane, now| self.apply(lane, id, target, reason, now))
    }

    pub fn fail(&self, id: BeadId, reason: &str) -> Result<Bead, CoreError> {
        self.with_lane_of(id, |lane, now| {
            self.apply(lane, id, BeadState::Failed, Some(reason.to_string()), now)
        })
    }

    pub fn block(&self, id: BeadId, reason: &str) -> Result<Bead, CoreError> {
        self.with_lane_of(id, |lane, now| {
            self.apply(lane, id, BeadState::Blocked, Some(reason.to_string()), now)
        })
    }

    /// Cancel a bead. Succeeds from every non-terminal state and is a no-op on
    /// an already cancelled bead.
    pub fn cancel(&self, id: BeadId) -> Result<Bead, CoreError> {
        self.with_lane_of(id, |lane, now| {
            self.apply(lane, id, BeadState::Cancelled, None, now)
        })
    }

    /// Fail the bead only if `predicate` still holds under the lane lock.
    ///
    /// Returns `Ok(None)` when the bead moved on since it was observed.
    pub fn fail_if<F>(&self, id: BeadId, reason: &str, predicate: F) -> Result<Option<Bead>, CoreError>
    where
        F: FnOnce(&Bead) -> bool,
    {
        self.with_lane_of(id, |lane, now| {
            let Some(record) = lane.beads.get(&id) else {
                return Ok(None);
            };
            if !record.bead.state.can_transition_to(BeadState::Failed) || !predicate(&record.bead)
            {
                return Ok(None);
            }
            self.apply(lane, id, BeadState::Failed, Some(reason.to_string()), now)
                .map(Some)
        })
    }

    /// Bind an agent to a bead by id. Records a heartbeat for the agent.
    pub fn bind_agent(&self, id: BeadId, agent_id: &str) -> Result<Bead, CoreError> {
        if agent_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("agent id must not be empty".to_string()));
        }
        self.agents.heartbeat(agent_id);

        self.with_lane_of(id, |lane, _| {
            let record = lane
                .beads
                .get_mut(&id)
                .ok_or(CoreError::BeadNotFound(id))?;
            if record.bead.is_terminal() {
                return Err(CoreError::InvalidInput(format!(
                    "bead {id} is {} and cannot be bound",
                    record.bead.state
                )));
            }
            record.bead.agent_id = Some(agent_id.to_string());
            debug!(bead_id = %id, agent_id, "Agent bound");
            Ok(record.bead.clone())
        })
    }

    /// Resolve a credential on behalf of a running bead.
    ///
    /// A missing credential parks the bead in `Blocked` and returns
    /// [`CoreError::MissingCredential`]. A resolved credential resumes a
    /// parked bead to `Running`.
    pub fn require_credential(
        &self,
        id: BeadId,
        source: &dyn CredentialSource,
        env_var: &str,
    ) -> Result<Credential, CoreError> {
        let status = source.resolve(env_var);

        self.with_lane_of(id, |lane, now| {
            let from = lane
                .beads
                .get(&id)
                .map(|record| record.bead.state)
                .ok_or(CoreError::BeadNotFound(id))?;

            match status {
                CredentialStatus::Missing(env_var) => {
                    let reason = format!("missing credential {env_var}");
                    match from {
                        BeadState::Running => {
                            self.apply(lane, id, BeadState::Blocked, Some(reason), now)?;
                        }
                        BeadState::Blocked => {
                            if let Some(record) = lane.beads.get_mut(&id) {
                                record.bead.blocked_on = Some(reason);
                            }
                        }
                        _ => {
                            return Err(CoreError::InvalidTransition {
                                bead_id: id,
                                from,
                                to: BeadState::Blocked,
                            });
                        }
                    }
                    warn!(bead_id = %id, env_var = %env_var, "Credential missing, bead blocked");
                    Err(CoreError::MissingCredential {
                        bead_id: id,
                        hint: remediation_hint(&env_var),
                        env_var,
                    })
                }
                CredentialStatus::Resolved(credential) => {
                    match from {
                        BeadState::Running => {}
                        BeadState::Blocked => {
                            self.apply(lane, id, BeadState::Running, None, now)?;
                            info!(bead_id = %id, env_var = %credential.env_var(), "Credential resolved, bead resumed");
                        }
                        _ => {
                            return Err(CoreError::InvalidTransition {
                                bead_id: id,
                                from,
                                to: BeadState::Running,
                            });
                        }
                    }
                    Ok(credential)
                }
            }
        })
    }

    /// Add a lane or change its budget, then re-evaluate admission.
    pub fn set_lane_budget(&self, name: &str, budget: usize) -> Result<LaneStatus, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidInput("lane name must not be empty".to_string()));
        }
        if budget == 0 {
            return Err(CoreError::InvalidBudget {
                lane: name.to_string(),
                reason: "budget must be at least 1".to_string(),
            });
        }

        let lane = self
            .lanes
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(lane = %name, budget, "Lane added");
                Arc::new(Mutex::new(LaneState::new(name, budget)))
            })
            .clone();

        let mut state = lane.lock();
        let previous = state.permits.budget();
        state.permits.set_budget(budget);
        if previous != budget {
            info!(lane = %name, previous, budget, "Lane budget changed");
        }
        let admitted = admission::admit(&mut state, Utc::now());
        self.emit_admitted(&admitted);
        Ok(admission::status(&state))
    }

    /// Re-evaluate admission for one lane. Never fails for lack of permits.
    pub fn admit(&self, lane: &str) -> Result<Vec<Bead>, CoreError> {
        let lane = self.lane(lane)?;
        let mut state = lane.lock();
        let admitted = admission::admit(&mut state, Utc::now());
        self.emit_admitted(&admitted);
        Ok(admitted)
    }

    /// Safety-net admission scan over every lane.
    pub fn admit_all(&self) -> Vec<Bead> {
        self.lane_handles()
            .into_iter()
            .flat_map(|lane| {
                let mut state = lane.lock();
                let admitted = admission::admit(&mut state, Utc::now());
                self.emit_admitted(&admitted);
                admitted
            })
            .collect()
    }

    /// Per-lane status, ordered by lane name.
    pub fn status(&self) -> Vec<LaneStatus> {
        self.lane_handles()
            .into_iter()
            .map(|lane| admission::status(&lane.lock()))
            .collect()
    }

    pub fn lane_status(&self, lane: &str) -> Result<LaneStatus, CoreError> {
        let lane = self.lane(lane)?;
        let state = lane.lock();
        Ok(admission::status(&state))
    }

    /// Beads matching `filter`, in creation order. Point-in-time per lane.
    pub fn list(&self, filter: &BeadFilter) -> Vec<Bead> {
        let lanes = match filter.lane.as_deref() {
            Some(name) => self.lane(name).map(|lane| vec![lane]).unwrap_or_default(),
            None => self.lane_handles(),
        };

        let mut beads: Vec<Bead> = lanes
            .into_iter()
            .flat_map(|lane| {
                let state = lane.lock();
                state
                    .beads
                    .values()
                    .filter(|record| filter.matches(&record.bead))
                    .map(|record| record.bead.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        beads.sort_by_key(|bead| bead.seq);
        beads
    }

    /// Remove terminal beads whose last transition is older than `cutoff`.
    pub fn evict_terminal(&self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for lane in self.lane_handles() {
            let mut state = lane.lock();
            let expired: Vec<BeadId> = state
                .beads
                .values()
                .filter(|record| record.bead.is_terminal() && record.bead.transitioned_at < cutoff)
                .map(|record| record.bead.id)
                .collect();
            for id in expired {
                state.beads.remove(&id);
                self.index.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Read-only aggregation of bead counts.
    pub fn kpi_snapshot(&self, agent_staleness: Duration) -> KpiSnapshot {
        let now = Utc::now();
        let mut snapshot = KpiSnapshot::empty(now);
        for lane in self.lane_handles() {
            let state = lane.lock();
            snapshot.record_lane(&state.name, state.beads.values().map(|r| r.bead.state));
        }
        snapshot.active_agents = self.agents.active_count(now, agent_staleness);
        snapshot
    }

    fn insert(&self, title: &str, lane_name: &str, enqueue: bool) -> Result<Bead, CoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidInput("title must not be empty".to_string()));
        }
        let lane = self.lane(lane_name)?;
        let now = Utc::now();

        let mut state = lane.lock();
        // Allocated under the lane lock so FIFO order equals commit order.
        let seq = self.next_bead_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bead = Bead::new(title.to_string(), lane_name.to_string(), seq, now);
        let id = bead.id;

        self.index.insert(id, lane_name.to_string());
        self.emit(&bead, None);
        if enqueue {
            bead.state = BeadState::Queued;
            state.waiting.insert(seq, id);
            self.emit(&bead, Some(BeadState::Created));
        }
        state.beads.insert(id, BeadRecord { bead, permit: None });

        let admitted = admission::admit(&mut state, now);
        self.emit_admitted(&admitted);

        let bead = state
            .beads
            .get(&id)
            .map(|record| record.bead.clone())
            .ok_or(CoreError::BeadNotFound(id))?;
        info!(bead_id = %id, lane = %lane_name, state = %bead.state, "Bead created");
        Ok(bead)
    }

    /// Apply one transition with the lane lock held.
    fn apply(
        &self,
        lane: &mut LaneState,
        id: BeadId,
        target: BeadState,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Bead, CoreError> {
        let from = lane
            .beads
            .get(&id)
            .map(|record| record.bead.state)
            .ok_or(CoreError::BeadNotFound(id))?;

        if from == BeadState::Cancelled && target == BeadState::Cancelled {
            return lane
                .beads
                .get(&id)
                .map(|record| record.bead.clone())
                .ok_or(CoreError::BeadNotFound(id));
        }
        if !from.can_transition_to(target) {
            debug!(bead_id = %id, %from, to = %target, "Transition rejected");
            return Err(CoreError::InvalidTransition {
                bead_id: id,
                from,
                to: target,
            });
        }
        if from == BeadState::Queued && target == BeadState::Running {
            let admitted = admission::admit(lane, now);
            self.emit_admitted(&admitted);
            return lane
                .beads
                .get(&id)
                .map(|record| record.bead.clone())
                .ok_or(CoreError::BeadNotFound(id));
        }

        let mut released = None;
        let bead = {
            let record = lane
                .beads
                .get_mut(&id)
                .ok_or(CoreError::BeadNotFound(id))?;

            match target {
                BeadState::Queued => {
                    lane.waiting.insert(record.bead.seq, id);
                }
                BeadState::Running => {
                    record.bead.retry_count += 1;
                    record.bead.blocked_on = None;
                }
                BeadState::Blocked => {
                    record.bead.blocked_on = reason;
                }
                BeadState::Done | BeadState::Failed | BeadState::Cancelled => {
                    if from == BeadState::Queued {
                        lane.waiting.remove(&record.bead.seq);
                    }
                    released = record.permit.take();
                    record.bead.permit_id = None;
                    record.bead.blocked_on = None;
                    if target == BeadState::Failed {
                        record.bead.last_error = reason;
                    }
                }
                BeadState::Created => {}
            }

            record.bead.state = target;
            record.bead.transitioned_at = now;
            record.bead.clone()
        };

        self.emit(&bead, Some(from));
        if target.is_terminal() {
            info!(bead_id = %id, lane = %bead.lane, %from, to = %target, "Bead finished");
        } else {
            debug!(bead_id = %id, lane = %bead.lane, %from, to = %target, "Bead transitioned");
        }

        let readmit = released.is_some() || target == BeadState::Queued;
        if let Some(permit) = released {
            lane.permits.release(permit);
        }
        if readmit {
            let admitted = admission::admit(lane, now);
            self.emit_admitted(&admitted);
            if let Some(record) = lane.beads.get(&id) {
                return Ok(record.bead.clone());
            }
        }

        Ok(bead)
    }

    fn emit(&self, bead: &Bead, old_state: Option<BeadState>) {
        let seq = self.next_event_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = BeadEvent::for_bead(seq, bead, old_state);
        for sink in self.sinks.read().iter() {
            sink.publish(&event);
        }
    }

    fn emit_admitted(&self, admitted: &[Bead]) {
        for bead in admitted {
            self.emit(bead, Some(BeadState::Queued));
        }
    }

    fn with_lane_of<T>(
        &self,
        id: BeadId,
        f: impl FnOnce(&mut LaneState, DateTime<Utc>) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let lane = self.lane_of(id)?;
        let mut state = lane.lock();
        f(&mut state, Utc::now())
    }

    fn lane(&self, name: &str) -> Result<LaneHandle, CoreError> {
        self.lanes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownLane(name.to_string()))
    }

    fn lane_of(&self, id: BeadId) -> Result<LaneHandle, CoreError> {
        let name = self
            .index
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(CoreError::BeadNotFound(id))?;
        self.lane(&name).map_err(|_| CoreError::BeadNotFound(id))
    }

    fn lane_handles(&self) -> Vec<LaneHandle> {
        self.lanes.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for BeadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeadStore")
            .field("lanes", &self.lane_names())
            .field("beads", &self.index.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
