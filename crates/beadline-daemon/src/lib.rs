//! # Beadline Daemon
//!
//! Runs the periodic maintenance loops around the bead store under one
//! shutdown contract.
//!
//! ## Features
//!
//! - Shutdown broadcast (`CancellationToken`) triggered once by API, SIGINT or SIGTERM
//! - Background loop supervisor with per-task descriptors, panic isolation and a grace period
//! - Patrol (stuck beads, stale agents, blocked timeouts, admission safety net)
//! - Agent heartbeat monitor
//! - KPI snapshot collector with bounded history
//! - Credential refresh with exponential backoff
//! - Retention cleanup for terminal beads and forgotten agents
//! - Notification outbox drained to log and webhook sinks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beadline_daemon::Daemon;
//!
//! let daemon = Daemon::new(config)?;
//! daemon.start()?;
//! daemon.shutdown().cancelled().await;
//! let report = daemon.stop().await;
//! ```

pub mod backoff;
pub mod cleanup;
pub mod credentials;
pub mod daemon;
pub mod error;
pub mod heartbeat;
pub mod kpi;
pub mod notify;
pub mod patrol;
pub mod shutdown;
pub mod supervisor;
pub mod task;

pub use backoff::Backoff;
pub use cleanup::CleanupTask;
pub use credentials::{CredentialHealth, CredentialRefresher};
pub use daemon::{Daemon, DaemonState};
pub use error::{DaemonError, TaskError};
pub use heartbeat::HeartbeatMonitor;
pub use kpi::{KpiCollector, KpiHistory};
pub use notify::{LogSink, NotificationDispatcher, NotificationOutbox, NotificationSink, WebhookSink};
pub use patrol::{PatrolReport, PatrolTask};
pub use shutdown::Shutdown;
pub use supervisor::{ShutdownReport, Supervisor};
pub use task::{BackgroundTask, TaskDescriptor, TaskOutcome};
