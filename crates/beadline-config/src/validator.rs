//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert into the first error, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_lanes(config, &mut result);
        Self::validate_daemon(config, &mut result);
        Self::validate_fanout(config, &mut result);
        Self::validate_notifications(config, &mut result);
        Self::validate_credentials(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_lanes(config: &Config, result: &mut ValidationResult) {
        if config.lanes.is_empty() {
            result.add_error(ValidationError::new(
                "lanes",
                "At least one lane must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for lane in &config.lanes {
            if lane.name.trim().is_empty() {
                result.add_error(ValidationError::new("lanes", "Lane name cannot be empty"));
            }
            if !seen.insert(lane.name.as_str()) {
                result.add_error(ValidationError::new(
                    format!("lanes.{}", lane.name),
                    "Duplicate lane name",
                ));
            }
            if lane.budget == 0 {
                result.add_error(ValidationError::new(
                    format!("lanes.{}.budget", lane.name),
                    "budget must be greater than 0",
                ));
            }
        }
    }

    fn validate_daemon(config: &Config, result: &mut ValidationResult) {
        let daemon = &config.daemon;
        let intervals = [
            ("daemon.patrol_interval_secs", daemon.patrol_interval_secs),
            ("daemon.heartbeat_interval_secs", daemon.heartbeat_interval_secs),
            ("daemon.kpi_interval_secs", daemon.kpi_interval_secs),
            (
                "daemon.credential_refresh_interval_secs",
                daemon.credential_refresh_interval_secs,
            ),
            ("daemon.cleanup_interval_secs", daemon.cleanup_interval_secs),
            (
                "daemon.notification_interval_secs",
                daemon.notification_interval_secs,
            ),
        ];
        for (path, secs) in intervals {
            if secs == 0 {
                result.add_error(ValidationError::new(path, "interval must be greater than 0"));
            }
        }

        if daemon.grace_period_secs == 0 {
            result.add_error(ValidationError::new(
                "daemon.grace_period_secs",
                "grace_period_secs must be greater than 0",
            ));
        }

        if daemon.heartbeat_staleness_secs < daemon.heartbeat_interval_secs {
            result.add_warning(ValidationWarning::new(
                "daemon.heartbeat_staleness_secs",
                "staleness window is shorter than the heartbeat interval, healthy agents may be failed",
            ));
        }

        if daemon.stuck_threshold_secs < daemon.patrol_interval_secs {
            result.add_warning(ValidationWarning::new(
                "daemon.stuck_threshold_secs",
                "stuck threshold is shorter than the patrol interval",
            ));
        }

        if daemon.kpi_history == 0 {
            result.add_warning(ValidationWarning::new(
                "daemon.kpi_history",
                "KPI history is disabled, snapshots will not be queryable",
            ));
        }
    }

    fn validate_fanout(config: &Config, result: &mut ValidationResult) {
        if config.fanout.high_water_mark == 0 {
            result.add_error(ValidationError::new(
                "fanout.high_water_mark",
                "high_water_mark must be greater than 0",
            ));
        }
    }

    fn validate_notifications(config: &Config, result: &mut ValidationResult) {
        let notifications = &config.notifications;
        if notifications.capacity == 0 {
            result.add_error(ValidationError::new(
                "notifications.capacity",
                "capacity must be greater than 0",
            ));
        }
        if notifications.batch_size == 0 {
            result.add_error(ValidationError::new(
                "notifications.batch_size",
                "batch_size must be greater than 0",
            ));
        }
        if let Some(ref url) = notifications.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                result.add_error(ValidationError::new(
                    "notifications.webhook_url",
                    "webhook_url must start with http:// or https://",
                ));
            }
        }
    }

    fn validate_credentials(config: &Config, result: &mut ValidationResult) {
        let credentials = &config.credentials;
        if credentials.backoff_initial_secs > credentials.backoff_max_secs {
            result.add_error(ValidationError::new(
                "credentials.backoff_initial_secs",
                "initial backoff cannot exceed backoff_max_secs",
            ));
        }
        for tracked in &credentials.tracked {
            if tracked.ttl_secs <= credentials.refresh_margin_secs {
                result.add_warning(ValidationWarning::new(
                    format!("credentials.tracked.{}", tracked.name),
                    "ttl is within the refresh margin, the credential will refresh every tick",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
