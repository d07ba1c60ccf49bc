//! Configuration loader.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        if let Some(dir) = config.logging.dir.take() {
            let dir = Self::expand_path(&dir.to_string_lossy());
            config.logging.dir = Some(dir.into());
        }
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.beadline`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.lanes.len(), 3);
    }

    #[test]
    fn test_load_lanes() {
        let content = r#"
            [[lanes]]
            name = "critical"
            budget = 2

            [[lanes]]
            name = "batch"
            budget = 8
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.lanes.len(), 2);
        assert_eq!(config.lanes[1].name, "batch");
        assert_eq!(config.lanes[1].budget, 8);
    }

    #[test]
    fn test_load_daemon_section() {
        let content = r#"
            [daemon]
            patrol_interval_secs = 5
            blocked_timeout_secs = 120
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.daemon.patrol_interval_secs, 5);
        assert_eq!(config.daemon.blocked_timeout_secs, Some(120));
        assert_eq!(config.daemon.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_load_tracked_credentials() {
        let content = r#"
            [[credentials.tracked]]
            name = "github"
            env_var = "GITHUB_TOKEN"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.credentials.tracked.len(), 1);
        assert_eq!(config.credentials.tracked[0].ttl_secs, 3600);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "port = 5000").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/beadline.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/beadline.toml")).unwrap();
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: unique test-only variable
        unsafe {
            std::env::set_var("BEADLINE_TEST_CONFIG_VAR", "test_value");
        }
        let content = "value = \"${BEADLINE_TEST_CONFIG_VAR}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert!(expanded.contains("test_value"));
        unsafe {
            std::env::remove_var("BEADLINE_TEST_CONFIG_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${BEADLINE_NONEXISTENT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/test");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/test"));
    }
}
