//! Loads and validates [`Config`] from defaults, project files, and the
//! environment, in ascending precedence.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, DeploymentMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("llm_model cannot be empty")]
    EmptyModel,

    #[error("database_path cannot be empty")]
    EmptyDatabasePath,

    #[error("min_coverage_percent must be between 0 and 100, got {0}")]
    InvalidCoveragePercent(f64),

    #[error("max_self_correct_attempts cannot be 0")]
    InvalidSelfCorrectAttempts,

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("invalid deployment_mode: {0}. Must be one of: selfhosted, hosted")]
    InvalidDeploymentMode(String),

    #[error("llm_max_retries cannot be 0")]
    InvalidMaxRetries,

    #[error(
        "llm_initial_backoff_ms ({0}) must be less than llm_max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Loads and validates [`Config`].
///
/// Precedence (lowest to highest):
/// 1. Programmatic defaults ([`Config::default`])
/// 2. `.codeframe/config.yaml` (project config)
/// 3. `.codeframe/local.yaml` (project-local overrides, optional)
/// 4. Environment variables (`CODEFRAME_*` prefix, highest priority)
///
/// Configuration is always project-local (`pwd/.codeframe/`), so multiple
/// projects on the same machine never share state.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".codeframe/config.yaml"))
            .merge(Yaml::file(".codeframe/local.yaml"))
            .merge(Env::prefixed("CODEFRAME_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.llm_model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if config.database_path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if !(0.0..=100.0).contains(&config.min_coverage_percent) {
            return Err(ConfigError::InvalidCoveragePercent(config.min_coverage_percent));
        }
        if config.max_self_correct_attempts == 0 {
            return Err(ConfigError::InvalidSelfCorrectAttempts);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if DeploymentMode::parse_str(config.deployment_mode.as_str()).is_none() {
            return Err(ConfigError::InvalidDeploymentMode(config.deployment_mode.as_str().to_string()));
        }

        if config.llm_max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        if config.llm_initial_backoff_ms >= config.llm_max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(config.llm_initial_backoff_ms, config.llm_max_backoff_ms));
        }

        Ok(())
    }
}
