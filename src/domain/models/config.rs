//! Runtime configuration, mirroring the keys the core recognizes.

use serde::{Deserialize, Serialize};

/// Deployment posture. Affects cross-user project creation and which
/// command validation policy is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Selfhosted,
    Hosted,
}

impl DeploymentMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Selfhosted => "selfhosted",
            Self::Hosted => "hosted",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "selfhosted" => Some(Self::Selfhosted),
            "hosted" => Some(Self::Hosted),
            _ => None,
        }
    }
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::Selfhosted
    }
}

/// Recognized configuration, loaded by [`crate::infrastructure::config::ConfigLoader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm_provider_key: String,
    pub llm_model: String,
    pub database_path: String,
    pub workspace_root: String,
    pub min_coverage_percent: f64,
    pub max_self_correct_attempts: u32,
    pub context_hot_budget_tokens: u64,
    pub context_warm_budget_tokens: u64,
    pub flash_save_headroom_ratio: f64,
    pub gate_timeout_seconds: u64,
    pub deployment_mode: DeploymentMode,
    pub logging: LoggingConfig,
    pub llm_max_retries: u32,
    pub llm_initial_backoff_ms: u64,
    pub llm_max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            retention_days: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider_key: String::new(),
            llm_model: "claude-sonnet".to_string(),
            database_path: ".codeframe/codeframe.db".to_string(),
            workspace_root: ".".to_string(),
            min_coverage_percent: 85.0,
            max_self_correct_attempts: 3,
            context_hot_budget_tokens: 8_000,
            context_warm_budget_tokens: 32_000,
            flash_save_headroom_ratio: 0.1,
            gate_timeout_seconds: 300,
            deployment_mode: DeploymentMode::default(),
            logging: LoggingConfig::default(),
            llm_max_retries: 3,
            llm_initial_backoff_ms: 10_000,
            llm_max_backoff_ms: 300_000,
        }
    }
}
