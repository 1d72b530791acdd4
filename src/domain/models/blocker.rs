//! Blocker domain model: an agent's escalation for human or peer input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the raising agent is paused awaiting the answer (`Sync`) or
/// continues on other work while the blocker waits (`Async`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Sync,
    Async,
}

impl BlockerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "sync" => Some(Self::Sync),
            "async" => Some(Self::Async),
            _ => None,
        }
    }
}

/// Urgency of a blocker, used to order the resolution queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BlockerSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Lifecycle status of a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerStatus {
    Open,
    Resolved,
    Abandoned,
}

impl BlockerStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Abandoned)
    }
}

/// A question raised by an agent that the queue must route to an answerer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub kind: BlockerKind,
    pub severity: BlockerSeverity,
    pub status: BlockerStatus,
    pub prompt: String,
    pub answer: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Blocker {
    pub fn new(
        task_id: Uuid,
        agent_id: Uuid,
        kind: BlockerKind,
        severity: BlockerSeverity,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_id,
            kind,
            severity,
            status: BlockerStatus::Open,
            prompt: prompt.into(),
            answer: None,
            deadline: None,
            created_at: Utc::now(),
            resolved_at: None,
            version: 0,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn resolve(&mut self, answer: impl Into<String>) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!("blocker already {}", self.status.as_str()));
        }
        self.answer = Some(answer.into());
        self.status = BlockerStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.version += 1;
        Ok(())
    }

    /// Raised when a deadline elapses with no answer; the queue gives up on
    /// delivering a response and wakes the waiter with a timeout error.
    pub fn abandon(&mut self) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!("blocker already {}", self.status.as_str()));
        }
        self.status = BlockerStatus::Abandoned;
        self.resolved_at = Some(Utc::now());
        self.version += 1;
        Ok(())
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}
