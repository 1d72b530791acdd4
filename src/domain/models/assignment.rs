//! Assignment domain model: the M-to-M link between an agent and a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links an agent to a project in a role. Deactivation is soft; the agent survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub agent_id: Uuid,
    pub role: String,
    pub assigned_at: DateTime<Utc>,
    pub is_active: bool,
    pub version: u64,
}

impl Assignment {
    pub fn new(project_id: Uuid, agent_id: Uuid, role: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            agent_id,
            role: role.into(),
            assigned_at: Utc::now(),
            is_active: true,
            version: 0,
        }
    }

    /// Soft-deactivate. The agent row itself is untouched.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.version += 1;
    }

    pub fn update_role(&mut self, role: impl Into<String>) {
        self.role = role.into();
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assignment_is_active() {
        let a = Assignment::new(Uuid::new_v4(), Uuid::new_v4(), "primary_backend");
        assert!(a.is_active);
    }

    #[test]
    fn deactivate_is_soft() {
        let mut a = Assignment::new(Uuid::new_v4(), Uuid::new_v4(), "primary_backend");
        let agent_id = a.agent_id;
        a.deactivate();
        assert!(!a.is_active);
        assert_eq!(a.agent_id, agent_id);
    }
}
