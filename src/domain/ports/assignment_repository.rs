use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Assignment;

/// Persistence port for [`Assignment`], the project-agent M-to-M link.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create(&self, assignment: &Assignment) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Assignment>;
    async fn update(&self, assignment: &Assignment) -> CoreResult<()>;
    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Assignment>>;
    async fn list_by_agent(&self, agent_id: Uuid) -> CoreResult<Vec<Assignment>>;
    async fn find_active(&self, project_id: Uuid, agent_id: Uuid) -> CoreResult<Option<Assignment>>;
}
