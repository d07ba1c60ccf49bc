//! # Beadline Config
//!
//! Configuration management for the Beadline daemon: lanes and their
//! concurrency budgets, background loop intervals, fan-out limits,
//! notification sinks, credential refresh policy and logging.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
