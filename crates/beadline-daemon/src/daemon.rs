//! Daemon assembly: the store, its sinks, and the background loops.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use beadline_config::{Config, ConfigError, ConfigValidator};
use beadline_core::{BeadStore, CredentialSource, EnvCredentials};
use beadline_events::EventFanout;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cleanup::CleanupTask;
use crate::credentials::{CredentialHealth, CredentialRefresher};
use crate::error::DaemonError;
use crate::heartbeat::HeartbeatMonitor;
use crate::kpi::{KpiCollector, KpiHistory};
use crate::notify::{LogSink, NotificationDispatcher, NotificationOutbox, NotificationSink, WebhookSink};
use crate::patrol::PatrolTask;
use crate::shutdown::Shutdown;
use crate::supervisor::{ShutdownReport, Supervisor};

/// Lifecycle of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DaemonState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    ShuttingDown = 3,
}

impl From<u8> for DaemonState {
    fn from(v: u8) -> Self {
        match v {
            1 => DaemonState::Starting,
            2 => DaemonState::Running,
            3 => DaemonState::ShuttingDown,
            _ => DaemonState::Stopped,
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::Stopped => write!(f, "stopped"),
            DaemonState::Starting => write!(f, "starting"),
            DaemonState::Running => write!(f, "running"),
            DaemonState::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

pub struct Daemon {
    config: Config,
    state: AtomicU8,
    started_at: DateTime<Utc>,
    store: Arc<BeadStore>,
    fanout: EventFanout,
    outbox: Option<Arc<NotificationOutbox>>,
    kpi_history: Arc<KpiHistory>,
    credentials: Arc<dyn CredentialSource>,
    refresher: Arc<CredentialRefresher>,
    supervisor: Supervisor,
    shutdown: Shutdown,
}

impl Daemon {
    /// Build a daemon that resolves credentials from the process environment.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        Self::with_credentials(config, Arc::new(EnvCredentials))
    }

    pub fn with_credentials(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, DaemonError> {
        for warning in ConfigValidator::validate(&config).into_result()? {
            warn!(field = %warning.path, "{}", warning.message);
        }

        let store = Arc::new(BeadStore::new(&config.lanes));
        let fanout = EventFanout::from_config(&config.fanout);
        store.add_sink(Arc::new(fanout.clone()));

        let outbox = config.notifications.enabled.then(|| {
            let outbox = Arc::new(NotificationOutbox::new(config.notifications.capacity));
            store.add_sink(outbox.clone());
            outbox
        });

        let kpi_history = Arc::new(KpiHistory::new(config.daemon.kpi_history));
        let refresher = Arc::new(CredentialRefresher::new(
            credentials.clone(),
            &config.credentials,
            config.daemon.credential_refresh_interval(),
        ));
        let shutdown = Shutdown::new();
        let supervisor = Supervisor::new(shutdown.clone(), config.daemon.grace_period());

        Ok(Self {
            config,
            state: AtomicU8::new(DaemonState::Stopped as u8),
            started_at: Utc::now(),
            store,
            fanout,
            outbox,
            kpi_history,
            credentials,
            refresher,
            supervisor,
            shutdown,
        })
    }

    /// Register and spawn the background loops. Requires a tokio runtime.
    pub fn start(&self) -> Result<(), DaemonError> {
        let sinks = match &self.outbox {
            Some(_) => Some(self.notification_sinks()?),
            None => None,
        };
        if let Err(current) = self.state.compare_exchange(
            DaemonState::Stopped as u8,
            DaemonState::Starting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(DaemonError::InvalidStateTransition {
                from: current.into(),
                to: DaemonState::Starting,
            });
        }
        info!(lanes = ?self.store.lane_names(), "Daemon starting");

        let daemon = &self.config.daemon;
        self.supervisor
            .register(Arc::new(PatrolTask::new(self.store.clone(), daemon)));
        self.supervisor.register(Arc::new(HeartbeatMonitor::new(
            self.store.agents().clone(),
            daemon.heartbeat_interval(),
            daemon.heartbeat_staleness(),
        )));
        self.supervisor.register(Arc::new(KpiCollector::new(
            self.store.clone(),
            self.kpi_history.clone(),
            daemon.kpi_interval(),
            daemon.heartbeat_staleness(),
        )));
        self.supervisor.register(self.refresher.clone());
        self.supervisor
            .register(Arc::new(CleanupTask::new(self.store.clone(), daemon)));
        if let (Some(outbox), Some(sinks)) = (&self.outbox, sinks) {
            self.supervisor.register(Arc::new(NotificationDispatcher::new(
                outbox.clone(),
                sinks,
                self.config.notifications.batch_size,
                daemon.notification_interval(),
            )));
        }

        self.supervisor.start();
        self.state
            .store(DaemonState::Running as u8, Ordering::SeqCst);
        info!("Daemon running");
        Ok(())
    }

    /// Trigger shutdown, close the fan-out and wait for the background loops.
    /// Safe to call more than once.
    pub async fn stop(&self) -> ShutdownReport {
        self.state
            .store(DaemonState::ShuttingDown as u8, Ordering::SeqCst);
        self.shutdown.trigger("daemon stop");
        self.fanout.close();

        let report = self.supervisor.shutdown().await;
        self.state.store(DaemonState::Stopped as u8, Ordering::SeqCst);
        info!(
            reason = ?self.shutdown.reason(),
            abandoned = report.abandoned.len(),
            "Daemon stopped"
        );
        report
    }

    pub fn state(&self) -> DaemonState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub fn is_running(&self) -> bool {
        self.state() == DaemonState::Running
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<BeadStore> {
        &self.store
    }

    pub fn fanout(&self) -> &EventFanout {
        &self.fanout
    }

    pub fn outbox(&self) -> Option<&Arc<NotificationOutbox>> {
        self.outbox.as_ref()
    }

    pub fn kpi_history(&self) -> &Arc<KpiHistory> {
        &self.kpi_history
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    pub fn credential_health(&self) -> Vec<CredentialHealth> {
        self.refresher.health()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    fn notification_sinks(&self) -> Result<Vec<Arc<dyn NotificationSink>>, DaemonError> {
        let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
        if let Some(url) = &self.config.notifications.webhook_url {
            let sink = WebhookSink::new(url.clone(), self.config.notifications.webhook_timeout())
                .map_err(|e| {
                    DaemonError::Config(ConfigError::InvalidValue {
                        field: "notifications.webhook_url".to_string(),
                        message: e.to_string(),
                    })
                })?;
            sinks.push(Arc::new(sink));
            info!(url = %url, "Webhook notification sink enabled");
        }
        Ok(sinks)
    }
}
