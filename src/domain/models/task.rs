//! Task domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Blocked,
    Review,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "review" => Some(Self::Review),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Assigned, Self::Failed],
            Self::Assigned => &[Self::InProgress, Self::Pending, Self::Failed],
            Self::InProgress => &[Self::Blocked, Self::Review, Self::Completed, Self::Failed],
            Self::Blocked => &[Self::Assigned, Self::Failed],
            Self::Review => &[Self::Assigned, Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Priority used to order ready tasks (`priority DESC, created_at ASC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Lower number sorts first in `ORDER BY ... ASC` (critical first).
    pub const fn sort_rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Verdict of the quality-gate pipeline for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGateStatus {
    NotRun,
    Passed,
    Failed,
}

impl QualityGateStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotRun => "not_run",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "not_run" => Some(Self::NotRun),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A unit of work dispatched to one agent within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub agent_type: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<Uuid>,
    pub depends_on: Vec<Uuid>,
    pub quality_gate_status: QualityGateStatus,
    pub quality_gate_failures: Vec<String>,
    pub self_correct_attempts: u32,
    pub max_self_correct_attempts: u32,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Task {
    pub fn new(project_id: Uuid, title: impl Into<String>, agent_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            title: title.into(),
            description: String::new(),
            agent_type: agent_type.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            assigned_to: None,
            depends_on: Vec::new(),
            quality_gate_status: QualityGateStatus::NotRun,
            quality_gate_failures: Vec::new(),
            self_correct_attempts: 0,
            max_self_correct_attempts: 3,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, depends_on: Vec<Uuid>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Validated transition; bumps `updated_at`/`version` and records lifecycle timestamps.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "invalid task status transition: {} -> {}",
                self.status.as_str(),
                target.as_str()
            ));
        }
        self.apply_status(target);
        Ok(())
    }

    /// Bypasses transition validation. Used by checkpoint restore.
    pub fn force_status(&mut self, target: TaskStatus) {
        if !self.status.can_transition_to(target) {
            tracing::warn!(
                task_id = %self.id,
                from = self.status.as_str(),
                to = target.as_str(),
                "forcing task status outside valid transition set"
            );
        }
        self.apply_status(target);
    }

    fn apply_status(&mut self, target: TaskStatus) {
        let now = Utc::now();
        if target == TaskStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if matches!(target, TaskStatus::Completed | TaskStatus::Failed) {
            self.completed_at = Some(now);
        }
        self.status = target;
        self.updated_at = now;
        self.version += 1;
    }

    pub fn assign_to(&mut self, agent_id: Uuid) -> Result<(), String> {
        self.transition_to(TaskStatus::Assigned)?;
        self.assigned_to = Some(agent_id);
        Ok(())
    }

    /// Whether another self-correction attempt remains before escalation.
    /// `max_self_correct_attempts` counts the failure that triggers
    /// escalation, not the number of reopens -- with a budget of 3, the
    /// task reopens after the 1st and 2nd failures and escalates on the 3rd.
    pub fn can_self_correct(&self) -> bool {
        self.self_correct_attempts + 1 < self.max_self_correct_attempts
    }

    pub fn record_self_correct_attempt(&mut self) {
        self.self_correct_attempts += 1;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn set_quality_gate_result(&mut self, status: QualityGateStatus, failures: Vec<String>) {
        self.quality_gate_status = status;
        self.quality_gate_failures = failures;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("task title cannot be empty".to_string());
        }
        if self.depends_on.contains(&self.id) {
            return Err("task cannot depend on itself".to_string());
        }
        Ok(())
    }
}

/// Returns the id of a task that participates in a `depends_on` cycle, if
/// any exists across the given set. `depends_on` edges must form a DAG
/// across a project's tasks; a non-`None` result means that invariant has
/// been violated and the offending set should be rejected.
///
/// Plain DFS with a recursion stack, same shape as a topological-sort cycle
/// check: white/gray/black coloring, a back-edge into a gray node is a cycle.
pub fn detect_cycle(tasks: &[Task]) -> Option<Uuid> {
    use std::collections::HashMap;

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut color: HashMap<Uuid, Color> = tasks.iter().map(|t| (t.id, Color::White)).collect();

    fn visit(id: Uuid, by_id: &HashMap<Uuid, &Task>, color: &mut HashMap<Uuid, Color>) -> Option<Uuid> {
        color.insert(id, Color::Gray);
        if let Some(task) = by_id.get(&id) {
            for &dep in &task.depends_on {
                match color.get(&dep).copied() {
                    Some(Color::Gray) => return Some(dep),
                    Some(Color::White) => {
                        if let Some(cycle_id) = visit(dep, by_id, color) {
                            return Some(cycle_id);
                        }
                    }
                    _ => {}
                }
            }
        }
        color.insert(id, Color::Black);
        None
    }

    for &id in by_id.keys() {
        if color.get(&id).copied() == Some(Color::White) {
            if let Some(cycle_id) = visit(id, &by_id, &mut color) {
                return Some(cycle_id);
            }
        }
    }
    None
}

/// `true` iff `depends_on` edges across `tasks` form a DAG (no cycles).
pub fn depends_on_forms_dag(tasks: &[Task]) -> bool {
    detect_cycle(tasks).is_none()
}
