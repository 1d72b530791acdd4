use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Blocker;

/// Persistence port for [`Blocker`].
#[async_trait]
pub trait BlockerRepository: Send + Sync {
    async fn create(&self, blocker: &Blocker) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Blocker>;
    async fn update(&self, blocker: &Blocker) -> CoreResult<()>;
    async fn list_by_project(&self, project_id: Uuid, open_only: bool) -> CoreResult<Vec<Blocker>>;
    async fn list_by_task(&self, task_id: Uuid) -> CoreResult<Vec<Blocker>>;
    async fn list_past_deadline(&self) -> CoreResult<Vec<Blocker>>;
}
