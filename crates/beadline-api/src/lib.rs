//! HTTP and WebSocket facade over a running [`Daemon`](beadline_daemon::Daemon).
//!
//! Every handler maps onto one store or daemon operation; no state lives here
//! beyond request bookkeeping.

pub mod error;
pub mod http;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use http::routes::create_router;
pub use state::AppState;
