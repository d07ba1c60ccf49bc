//! Bead, agent and lane handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use beadline_core::{AgentRecord, Bead, BeadFilter, BeadId, BeadState, LaneStatus};
use beadline_daemon::DaemonState;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Request to create a bead.
#[derive(Debug, Deserialize)]
pub struct CreateBeadRequest {
    pub title: String,
    pub lane: String,
    /// Leave the bead in `created` instead of queueing it.
    #[serde(default)]
    pub hold: bool,
}

/// Query string for listing beads. States parse case-insensitively.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
    pub lane: Option<String>,
    pub agent: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<BeadFilter, ApiError> {
        let mut filter = BeadFilter::default();
        if let Some(state) = self.state {
            filter = filter.with_state(state.parse().map_err(ApiError::BadRequest)?);
        }
        if let Some(lane) = self.lane {
            filter = filter.with_lane(lane);
        }
        if let Some(agent) = self.agent {
            filter = filter.with_agent(agent);
        }
        Ok(filter)
    }
}

#[derive(Debug, Serialize)]
pub struct BeadListResponse {
    pub count: usize,
    pub beads: Vec<Bead>,
}

/// Request to move a bead to another state.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub state: BeadState,
    /// Recorded as the bead's last error for `failed` and `blocked`.
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BindAgentRequest {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub env_var: String,
}

#[derive(Debug, Deserialize)]
pub struct LaneBudgetRequest {
    pub budget: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub daemon: DaemonState,
    pub beads: usize,
    pub lanes: Vec<LaneStatus>,
}

pub async fn create_bead(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBeadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store();
    let bead = if req.hold {
        store.create_held(&req.title, &req.lane)?
    } else {
        store.create(&req.title, &req.lane)?
    };
    Ok((StatusCode::CREATED, Json(bead)))
}

pub async fn list_beads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<BeadListResponse>, ApiError> {
    let beads = state.store().list(&query.into_filter()?);
    Ok(Json(BeadListResponse {
        count: beads.len(),
        beads,
    }))
}

pub async fn get_bead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BeadId>,
) -> Result<Json<Bead>, ApiError> {
    Ok(Json(state.store().get(id)?))
}

pub async fn transition_bead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BeadId>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Bead>, ApiError> {
    let store = state.store();
    let bead = match (req.state, req.reason.as_deref()) {
        (BeadState::Failed, Some(reason)) => store.fail(id, reason)?,
        (BeadState::Blocked, Some(reason)) => store.block(id, reason)?,
        (target, _) => store.transition(id, target)?,
    };
    Ok(Json(bead))
}

pub async fn cancel_bead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BeadId>,
) -> Result<Json<Bead>, ApiError> {
    Ok(Json(state.store().cancel(id)?))
}

pub async fn bind_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BeadId>,
    Json(req): Json<BindAgentRequest>,
) -> Result<Json<Bead>, ApiError> {
    Ok(Json(state.store().bind_agent(id, &req.agent_id)?))
}

pub async fn require_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BeadId>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<Bead>, ApiError> {
    let credentials = state.daemon.credentials();
    // The resolved secret stays server-side; callers only see the bead.
    let _credential = state
        .store()
        .require_credential(id, credentials.as_ref(), &req.env_var)?;
    Ok(Json(state.store().get(id)?))
}

pub async fn agent_heartbeat(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    if agent_id.trim().is_empty() {
        return Err(ApiError::BadRequest("agent id must not be empty".to_string()));
    }
    Ok(Json(state.store().agents().heartbeat(&agent_id)))
}

pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentRecord>> {
    Json(state.store().agents().list())
}

pub async fn lane_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        daemon: state.daemon.state(),
        beads: state.store().len(),
        lanes: state.store().status(),
    })
}

pub async fn set_lane_budget(
    State(state): State<Arc<AppState>>,
    Path(lane): Path<String>,
    Json(req): Json<LaneBudgetRequest>,
) -> Result<Json<LaneStatus>, ApiError> {
    let status = state.store().set_lane_budget(&lane, req.budget)?;
    info!(lane = %lane, budget = req.budget, "Lane budget updated via API");
    Ok(Json(status))
}
