use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Checkpoint;

/// Persistence port for [`Checkpoint`].
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn create(&self, checkpoint: &Checkpoint) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Checkpoint>;
    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Checkpoint>>;
    async fn latest_for_project(&self, project_id: Uuid) -> CoreResult<Option<Checkpoint>>;
}
