//! Health, KPI, background task and shutdown handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use beadline_core::KpiSnapshot;
use beadline_daemon::{CredentialHealth, DaemonState, TaskDescriptor};
use beadline_events::SubscriberStats;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub daemon: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct KpiQuery {
    /// Most recent N snapshots; all retained snapshots when absent.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct KpiResponse {
    pub count: usize,
    pub snapshots: Vec<KpiSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct FanoutResponse {
    pub published: u64,
    pub subscribers: Vec<SubscriberStats>,
}

#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub accepted: bool,
    pub message: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let daemon = state.daemon.state();
    let status = match daemon {
        DaemonState::Running => "ok",
        _ => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        daemon: daemon.to_string(),
        uptime_seconds: state.uptime().as_secs(),
        total_requests: state.request_count(),
    })
}

pub async fn kpi_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KpiQuery>,
) -> Json<KpiResponse> {
    let snapshots = state.daemon.kpi_history().recent(query.limit);
    Json(KpiResponse {
        count: snapshots.len(),
        snapshots,
    })
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskDescriptor>> {
    Json(state.daemon.supervisor().descriptors())
}

pub async fn credential_health(State(state): State<Arc<AppState>>) -> Json<Vec<CredentialHealth>> {
    Json(state.daemon.credential_health())
}

pub async fn fanout_stats(State(state): State<Arc<AppState>>) -> Json<FanoutResponse> {
    let fanout = state.daemon.fanout();
    Json(FanoutResponse {
        published: fanout.published(),
        subscribers: fanout.stats(),
    })
}

/// Request graceful shutdown. The server drains and the daemon stops its loops.
pub async fn shutdown(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let fired = state.request_shutdown();
    if fired {
        info!("Shutdown requested via API");
    }
    let message = if fired {
        "shutdown initiated"
    } else {
        "shutdown already in progress"
    };
    (
        StatusCode::ACCEPTED,
        Json(ShutdownResponse {
            accepted: fired,
            message: message.to_string(),
        }),
    )
}
