//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Execution lanes with their concurrency budgets.
    #[serde(default = "default_lanes")]
    pub lanes: Vec<LaneConfig>,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            lanes: default_lanes(),
            daemon: DaemonConfig::default(),
            fanout: FanoutConfig::default(),
            notifications: NotificationConfig::default(),
            credentials: CredentialsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9090
}

/// A named lane and the number of beads it may run at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub name: String,
    pub budget: usize,
}

impl LaneConfig {
    pub fn new(name: impl Into<String>, budget: usize) -> Self {
        Self {
            name: name.into(),
            budget,
        }
    }
}

fn default_lanes() -> Vec<LaneConfig> {
    vec![
        LaneConfig::new("critical", 1),
        LaneConfig::new("standard", 4),
        LaneConfig::new("experimental", 1),
    ]
}

/// Background loop intervals and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Patrol sweep interval (in seconds).
    #[serde(default = "default_patrol_interval")]
    pub patrol_interval_secs: u64,

    /// Heartbeat monitor interval (in seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// KPI snapshot interval (in seconds).
    #[serde(default = "default_kpi_interval")]
    pub kpi_interval_secs: u64,

    /// Credential refresh check interval (in seconds).
    #[serde(default = "default_credential_interval")]
    pub credential_refresh_interval_secs: u64,

    /// Cache cleanup interval (in seconds).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Notification dispatch interval (in seconds).
    #[serde(default = "default_notification_interval")]
    pub notification_interval_secs: u64,

    /// How long shutdown waits for background tasks (in seconds).
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// A bead running longer than this without transitioning is failed by patrol.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,

    /// An agent silent for longer than this is stale.
    #[serde(default = "default_heartbeat_staleness")]
    pub heartbeat_staleness_secs: u64,

    /// Beads parked in `Blocked` longer than this are failed. Unset = never.
    #[serde(default)]
    pub blocked_timeout_secs: Option<u64>,

    /// How long terminal beads stay queryable before cleanup evicts them.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Agents unseen for this long are dropped from the registry.
    #[serde(default = "default_agent_forget")]
    pub agent_forget_secs: u64,

    /// Number of KPI snapshots kept in memory.
    #[serde(default = "default_kpi_history")]
    pub kpi_history: usize,
}

fn default_patrol_interval() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_kpi_interval() -> u64 {
    300
}

fn default_credential_interval() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    600
}

fn default_notification_interval() -> u64 {
    5
}

fn default_grace_period() -> u64 {
    10
}

fn default_stuck_threshold() -> u64 {
    1800 // 30 minutes
}

fn default_heartbeat_staleness() -> u64 {
    60 // 2x heartbeat interval
}

fn default_retention() -> u64 {
    86_400
}

fn default_agent_forget() -> u64 {
    3600
}

fn default_kpi_history() -> usize {
    288 // one day at the default interval
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            patrol_interval_secs: default_patrol_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            kpi_interval_secs: default_kpi_interval(),
            credential_refresh_interval_secs: default_credential_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            notification_interval_secs: default_notification_interval(),
            grace_period_secs: default_grace_period(),
            stuck_threshold_secs: default_stuck_threshold(),
            heartbeat_staleness_secs: default_heartbeat_staleness(),
            blocked_timeout_secs: None,
            retention_secs: default_retention(),
            agent_forget_secs: default_agent_forget(),
            kpi_history: default_kpi_history(),
        }
    }
}

impl DaemonConfig {
    pub fn patrol_interval(&self) -> Duration {
        Duration::from_secs(self.patrol_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn kpi_interval(&self) -> Duration {
        Duration::from_secs(self.kpi_interval_secs)
    }

    pub fn credential_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.credential_refresh_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn notification_interval(&self) -> Duration {
        Duration::from_secs(self.notification_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    pub fn heartbeat_staleness(&self) -> Duration {
        Duration::from_secs(self.heartbeat_staleness_secs)
    }

    pub fn blocked_timeout(&self) -> Option<Duration> {
        self.blocked_timeout_secs.map(Duration::from_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn agent_forget(&self) -> Duration {
        Duration::from_secs(self.agent_forget_secs)
    }
}

/// Event fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Events buffered per subscriber before the oldest are collapsed into a gap marker.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
        }
    }
}

fn default_high_water_mark() -> usize {
    256
}

/// External notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Outbox capacity; the oldest notifications are discarded past it.
    #[serde(default = "default_outbox_capacity")]
    pub capacity: usize,

    /// Maximum notifications handed to sinks per dispatch tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Optional webhook receiving JSON batches.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_outbox_capacity(),
            batch_size: default_batch_size(),
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

impl NotificationConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_outbox_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    64
}

fn default_webhook_timeout() -> u64 {
    10
}

/// Credential refresh policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Tokens are renewed when they expire within this window (in seconds).
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,

    /// First retry delay after a failed refresh (in seconds).
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_secs: u64,

    /// Upper bound on the retry delay (in seconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Credentials re-resolved from the environment by the refresh monitor.
    #[serde(default)]
    pub tracked: Vec<TrackedCredential>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin(),
            backoff_initial_secs: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
            tracked: Vec::new(),
        }
    }
}

impl CredentialsConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// A credential read from an environment variable and treated as valid for `ttl_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCredential {
    pub name: String,
    pub env_var: String,
    #[serde(default = "default_credential_ttl")]
    pub ttl_secs: u64,
}

fn default_refresh_margin() -> u64 {
    300
}

fn default_backoff_initial() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    600
}

fn default_credential_ttl() -> u64 {
    3600
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files. `None` disables file logging.
    #[serde(default = "default_log_dir")]
    pub dir: Option<PathBuf>,

    /// Emit JSON lines on the console instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("beadline").join("logs"))
}
