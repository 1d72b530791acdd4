//! Event domain model: the append-only fact stream the bus fans out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed vocabulary of facts the core publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProjectCreated,
    ProjectStatusChanged,
    AgentAssigned,
    AgentUnassigned,
    AgentStarted,
    AgentStatusChanged,
    TaskCreated,
    TaskAssigned,
    TaskStarted,
    TaskBlocked,
    TaskUnblocked,
    TaskCompleted,
    TaskFailed,
    QualityGateResult,
    ReviewCompleted,
    BlockerRaised,
    BlockerResolved,
    CheckpointCreated,
    CheckpointRestored,
    ContextRetier,
    FlashSave,
    LintCompleted,
    ChatMessage,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectStatusChanged => "project_status_changed",
            Self::AgentAssigned => "agent_assigned",
            Self::AgentUnassigned => "agent_unassigned",
            Self::AgentStarted => "agent_started",
            Self::AgentStatusChanged => "agent_status_changed",
            Self::TaskCreated => "task_created",
            Self::TaskAssigned => "task_assigned",
            Self::TaskStarted => "task_started",
            Self::TaskBlocked => "task_blocked",
            Self::TaskUnblocked => "task_unblocked",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::QualityGateResult => "quality_gate_result",
            Self::ReviewCompleted => "review_completed",
            Self::BlockerRaised => "blocker_raised",
            Self::BlockerResolved => "blocker_resolved",
            Self::CheckpointCreated => "checkpoint_created",
            Self::CheckpointRestored => "checkpoint_restored",
            Self::ContextRetier => "context_retier",
            Self::FlashSave => "flash_save",
            Self::LintCompleted => "lint_completed",
            Self::ChatMessage => "chat_message",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Some(match s {
            "project_created" => Self::ProjectCreated,
            "project_status_changed" => Self::ProjectStatusChanged,
            "agent_assigned" => Self::AgentAssigned,
            "agent_unassigned" => Self::AgentUnassigned,
            "agent_started" => Self::AgentStarted,
            "agent_status_changed" => Self::AgentStatusChanged,
            "task_created" => Self::TaskCreated,
            "task_assigned" => Self::TaskAssigned,
            "task_started" => Self::TaskStarted,
            "task_blocked" => Self::TaskBlocked,
            "task_unblocked" => Self::TaskUnblocked,
            "task_completed" => Self::TaskCompleted,
            "task_failed" => Self::TaskFailed,
            "quality_gate_result" => Self::QualityGateResult,
            "review_completed" => Self::ReviewCompleted,
            "blocker_raised" => Self::BlockerRaised,
            "blocker_resolved" => Self::BlockerResolved,
            "checkpoint_created" => Self::CheckpointCreated,
            "checkpoint_restored" => Self::CheckpointRestored,
            "context_retier" => Self::ContextRetier,
            "flash_save" => Self::FlashSave,
            "lint_completed" => Self::LintCompleted,
            "chat_message" => Self::ChatMessage,
            _ => return None,
        })
    }

    /// Connection-level events delivered regardless of a subscriber's
    /// project filter (pings, global health). Currently none are modeled
    /// as filter-exempt at the domain level; the bus handles pings out of
    /// band rather than as persisted events.
    pub const fn is_filter_exempt(&self) -> bool {
        false
    }
}

/// A single fact on the append-only event log. `seq` is monotonic per bus
/// and is assigned by the bus, not the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub project_id: Option<Uuid>,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(seq: u64, project_id: Option<Uuid>, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            seq,
            project_id,
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn matches_filter(&self, filter: &std::collections::HashSet<Uuid>) -> bool {
        if self.event_type.is_filter_exempt() {
            return true;
        }
        match self.project_id {
            Some(pid) => filter.contains(&pid),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn event_type_round_trips_through_str() {
        for s in [
            "project_created",
            "task_blocked",
            "quality_gate_result",
            "flash_save",
            "chat_message",
        ] {
            let parsed = EventType::parse_str(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn filter_excludes_non_member_project() {
        let mut filter = HashSet::new();
        let tracked = Uuid::new_v4();
        filter.insert(tracked);
        let event = Event::new(1, Some(Uuid::new_v4()), EventType::TaskCreated, serde_json::json!({}));
        assert!(!event.matches_filter(&filter));

        let event2 = Event::new(2, Some(tracked), EventType::TaskCreated, serde_json::json!({}));
        assert!(event2.matches_filter(&filter));
    }
}
