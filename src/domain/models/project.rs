//! Project domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a project. May oscillate `Running` <-> `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Created,
    Running,
    Paused,
    Failed,
    Completed,
}

impl ProjectStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Project phase. Advances monotonically, independent of `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Discovery,
    Planning,
    Active,
    Review,
    Done,
}

impl ProjectPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Review => "review",
            Self::Done => "done",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "discovery" => Some(Self::Discovery),
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// The next phase in the monotonic sequence, if any.
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Discovery => Some(Self::Planning),
            Self::Planning => Some(Self::Active),
            Self::Active => Some(Self::Review),
            Self::Review => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// A unit of work the orchestration core tracks end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub phase: ProjectPhase,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Project {
    pub fn new(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            status: ProjectStatus::Created,
            phase: ProjectPhase::Discovery,
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `start()`: `Created`/`Paused` -> `Running`.
    pub fn start(&mut self) -> Result<(), String> {
        match self.status {
            ProjectStatus::Created | ProjectStatus::Paused => {
                self.status = ProjectStatus::Running;
                self.updated_at = Utc::now();
                self.version += 1;
                Ok(())
            }
            other => Err(format!("cannot start project from status {}", other.as_str())),
        }
    }

    pub fn pause(&mut self) -> Result<(), String> {
        if self.status != ProjectStatus::Running {
            return Err(format!("cannot pause project from status {}", self.status.as_str()));
        }
        self.status = ProjectStatus::Paused;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), String> {
        if self.status != ProjectStatus::Paused {
            return Err(format!("cannot resume project from status {}", self.status.as_str()));
        }
        self.status = ProjectStatus::Running;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn fail(&mut self) {
        self.status = ProjectStatus::Failed;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn complete(&mut self) {
        self.status = ProjectStatus::Completed;
        self.phase = ProjectPhase::Done;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    /// Advance to the next phase in sequence. No-op past `Done`.
    pub fn advance_phase(&mut self) {
        if let Some(next) = self.phase.next() {
            self.phase = next;
            self.updated_at = Utc::now();
            self.version += 1;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("project name cannot be empty".to_string());
        }
        if self.user_id.trim().is_empty() {
            return Err("project user_id cannot be empty".to_string());
        }
        Ok(())
    }
}
