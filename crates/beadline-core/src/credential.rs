//! Credential capability.
//!
//! Integrations never read the environment directly; they ask a
//! [`CredentialSource`], which either resolves the secret or names the
//! variable that is missing.

use std::collections::HashMap;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

/// A resolved secret. `Debug` output never contains the value.
#[derive(Debug)]
pub struct Credential {
    env_var: String,
    secret: SecretString,
}

impl Credential {
    pub fn new(env_var: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

#[derive(Debug)]
pub enum CredentialStatus {
    Resolved(Credential),
    /// Names the environment variable that is unset or empty.
    Missing(String),
}

pub trait CredentialSource: Send + Sync {
    fn resolve(&self, env_var: &str) -> CredentialStatus;
}

/// Resolves credentials from the process environment. Empty values count as missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve(&self, env_var: &str) -> CredentialStatus {
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                CredentialStatus::Resolved(Credential::new(env_var, value))
            }
            _ => CredentialStatus::Missing(env_var.to_string()),
        }
    }
}

/// In-memory credential source for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    values: RwLock<HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, env_var: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(env_var.into(), value.into());
    }

    pub fn remove(&self, env_var: &str) {
        self.values.write().remove(env_var);
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve(&self, env_var: &str) -> CredentialStatus {
        match self.values.read().get(env_var) {
            Some(value) if !value.is_empty() => {
                CredentialStatus::Resolved(Credential::new(env_var, value.clone()))
            }
            _ => CredentialStatus::Missing(env_var.to_string()),
        }
    }
}

/// Remediation hint for a missing variable.
pub fn remediation_hint(env_var: &str) -> String {
    format!("set {env_var} in the daemon environment and retry")
}
