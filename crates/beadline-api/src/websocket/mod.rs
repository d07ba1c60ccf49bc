//! WebSocket event stream.

mod handler;

pub use handler::{WsQuery, ws_handler};
