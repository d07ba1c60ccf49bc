//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::http::{handlers, monitoring};
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Build the API router.
///
/// ```text
/// /api/beads
///   POST   /api/beads                      - Create bead
///   GET    /api/beads?state=&lane=&agent=  - List beads
///   GET    /api/beads/{id}                 - Get bead
///   POST   /api/beads/{id}/transition      - Request state change
///   POST   /api/beads/{id}/cancel          - Cancel bead
///   POST   /api/beads/{id}/agent           - Bind agent
///   POST   /api/beads/{id}/credential      - Require credential
///
/// /api/agents
///   GET    /api/agents                     - List agents
///   POST   /api/agents/{id}/heartbeat      - Record heartbeat
///
/// /api
///   GET    /api/status                     - Lane status
///   PUT    /api/lanes/{name}               - Set lane budget
///   GET    /api/kpi?limit=                 - KPI history
///   GET    /api/tasks                      - Background task descriptors
///   GET    /api/credentials                - Tracked credential health
///   GET    /api/fanout                     - Subscriber counters
///   POST   /api/shutdown                   - Graceful shutdown
///
/// /health                                  - Liveness
/// /ws?lane=&bead_id=&state=                - Event stream
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let bead_routes = Router::new()
        .route("/", post(handlers::create_bead).get(handlers::list_beads))
        .route("/{id}", get(handlers::get_bead))
        .route("/{id}/transition", post(handlers::transition_bead))
        .route("/{id}/cancel", post(handlers::cancel_bead))
        .route("/{id}/agent", post(handlers::bind_agent))
        .route("/{id}/credential", post(handlers::require_credential));

    let agent_routes = Router::new()
        .route("/", get(handlers::list_agents))
        .route("/{id}/heartbeat", post(handlers::agent_heartbeat));

    let api_routes = Router::new()
        .nest("/beads", bead_routes)
        .nest("/agents", agent_routes)
        .route("/status", get(handlers::lane_status))
        .route("/lanes/{name}", put(handlers::set_lane_budget))
        .route("/kpi", get(monitoring::kpi_history))
        .route("/tasks", get(monitoring::list_tasks))
        .route("/credentials", get(monitoring::credential_health))
        .route("/fanout", get(monitoring::fanout_stats))
        .route("/shutdown", post(monitoring::shutdown));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(monitoring::health))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn count_requests(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    state.increment_requests();
    next.run(request).await
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
