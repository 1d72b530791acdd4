//! Agent domain model.
//!
//! An agent is a reusable LLM-driven worker, not owned by any one project;
//! [`Assignment`](super::assignment::Assignment) links it to projects it is
//! currently working on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agent specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Lead,
    Backend,
    Frontend,
    Test,
    Review,
    Custom,
}

impl AgentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Test => "test",
            Self::Review => "review",
            Self::Custom => "custom",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(Self::Lead),
            "backend" => Some(Self::Backend),
            "frontend" => Some(Self::Frontend),
            "test" => Some(Self::Test),
            "review" => Some(Self::Review),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Autonomy level, influencing how directive generated prompts are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    D1,
    D2,
    D3,
    D4,
}

impl Maturity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::D1 => "d1",
            Self::D2 => "d2",
            Self::D3 => "d3",
            Self::D4 => "d4",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "d1" => Some(Self::D1),
            "d2" => Some(Self::D2),
            "d3" => Some(Self::D3),
            "d4" => Some(Self::D4),
            _ => None,
        }
    }
}

/// Runtime status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Blocked,
    Offline,
}

impl AgentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Blocked => "blocked",
            Self::Offline => "offline",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "working" => Some(Self::Working),
            "blocked" => Some(Self::Blocked),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    fn valid_transitions(&self) -> &'static [AgentStatus] {
        match self {
            Self::Idle => &[Self::Working, Self::Offline],
            Self::Working => &[Self::Idle, Self::Blocked, Self::Offline],
            Self::Blocked => &[Self::Working, Self::Idle, Self::Offline],
            Self::Offline => &[Self::Idle],
        }
    }

    pub fn can_transition_to(&self, target: AgentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// A reusable LLM-driven worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub agent_type: AgentType,
    pub provider: String,
    pub maturity: Maturity,
    pub status: AgentStatus,
    pub context_tokens: u64,
    pub version: u64,
}

impl Agent {
    pub fn new(agent_type: AgentType, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type,
            provider: provider.into(),
            maturity: Maturity::D1,
            status: AgentStatus::Idle,
            context_tokens: 0,
            version: 0,
        }
    }

    pub fn with_maturity(mut self, maturity: Maturity) -> Self {
        self.maturity = maturity;
        self
    }

    /// Validated transition; fails if `target` is not reachable from the current status.
    pub fn transition_to(&mut self, target: AgentStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "invalid agent status transition: {} -> {}",
                self.status.as_str(),
                target.as_str()
            ));
        }
        self.status = target;
        self.version += 1;
        Ok(())
    }

    /// Bypasses transition validation. Used for checkpoint restore / crash recovery.
    pub fn force_status(&mut self, target: AgentStatus) {
        if !self.status.can_transition_to(target) {
            tracing::warn!(
                agent_id = %self.id,
                from = self.status.as_str(),
                to = target.as_str(),
                "forcing agent status outside valid transition set"
            );
        }
        self.status = target;
        self.version += 1;
    }

    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_working_is_valid() {
        let mut a = Agent::new(AgentType::Backend, "anthropic");
        assert!(a.transition_to(AgentStatus::Working).is_ok());
        assert_eq!(a.status, AgentStatus::Working);
    }

    #[test]
    fn offline_to_working_is_invalid() {
        let mut a = Agent::new(AgentType::Backend, "anthropic");
        a.force_status(AgentStatus::Offline);
        assert!(a.transition_to(AgentStatus::Working).is_err());
    }

    #[test]
    fn force_status_bypasses_validation() {
        let mut a = Agent::new(AgentType::Backend, "anthropic");
        a.force_status(AgentStatus::Offline);
        a.force_status(AgentStatus::Working);
        assert_eq!(a.status, AgentStatus::Working);
    }

    #[test]
    fn version_bumps_on_transition() {
        let mut a = Agent::new(AgentType::Backend, "anthropic");
        let v0 = a.version;
        a.transition_to(AgentStatus::Working).unwrap();
        assert_eq!(a.version, v0 + 1);
    }
}
