use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::{MemoryItem, MemoryTier};

/// Persistence port for [`MemoryItem`].
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn create(&self, item: &MemoryItem) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<MemoryItem>;
    async fn update(&self, item: &MemoryItem) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn list_by_agent(&self, agent_id: Uuid, project_id: Uuid) -> CoreResult<Vec<MemoryItem>>;
    async fn list_by_tier(&self, agent_id: Uuid, tier: MemoryTier) -> CoreResult<Vec<MemoryItem>>;
    async fn sum_hot_tokens(&self, agent_id: Uuid) -> CoreResult<u64>;
}
