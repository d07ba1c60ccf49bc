//! # Beadline Core
//!
//! Authoritative in-memory bead store for the Beadline orchestration daemon.
//!
//! ## Features
//!
//! - Bead state machine (`Created → Queued → Running → Done | Failed | Cancelled`, plus `Blocked`)
//! - Per-lane concurrency budgets enforced with exclusively owned permits
//! - FIFO admission within a lane, independent across lanes
//! - Agent heartbeat registry
//! - Credential capability (`Resolved` / `Missing`) that parks beads in `Blocked`
//! - Synchronous event publication to registered sinks, in commit order per bead

pub mod admission;
pub mod agent;
pub mod bead;
pub mod credential;
pub mod error;
pub mod event;
pub mod kpi;
pub mod lane;
pub mod store;

pub use admission::LaneStatus;
pub use agent::{AgentRecord, AgentRegistry, Liveness, StaleAgent};
pub use bead::{Bead, BeadFilter, BeadId, BeadState};
pub use credential::{
    Credential, CredentialSource, CredentialStatus, EnvCredentials, StaticCredentials,
};
pub use error::CoreError;
pub use event::{BeadEvent, EventSink};
pub use kpi::KpiSnapshot;
pub use lane::Permit;
pub use store::BeadStore;
