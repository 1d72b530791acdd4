use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Agent;

/// Persistence port for [`Agent`].
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Agent>;
    async fn update(&self, agent: &Agent) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn list(&self) -> CoreResult<Vec<Agent>>;
    async fn list_available(&self) -> CoreResult<Vec<Agent>>;
}
