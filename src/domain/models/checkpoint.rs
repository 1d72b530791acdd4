//! Checkpoint domain model: a restorable snapshot of project state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, restorable point-in-time snapshot of a project's entity state
/// plus the workspace git ref captured alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub git_ref: Option<String>,
    pub state_snapshot: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Checkpoint {
    pub fn new(
        project_id: Uuid,
        name: impl Into<String>,
        state_snapshot: Vec<u8>,
        git_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            description: String::new(),
            git_ref,
            state_snapshot,
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("checkpoint name cannot be empty".to_string());
        }
        if self.state_snapshot.is_empty() {
            return Err("checkpoint state snapshot cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checkpoint_validates() {
        let c = Checkpoint::new(Uuid::new_v4(), "pre-migration", vec![1, 2, 3], Some("abc123".into()));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_snapshot_fails_validation() {
        let c = Checkpoint::new(Uuid::new_v4(), "pre-migration", vec![], None);
        assert!(c.validate().is_err());
    }
}
