use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Project;

/// Persistence port for [`Project`].
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Project>;
    async fn update(&self, project: &Project) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn list(&self) -> CoreResult<Vec<Project>>;
    async fn list_by_user(&self, user_id: &str) -> CoreResult<Vec<Project>>;
}
