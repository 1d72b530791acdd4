use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::Event;

/// Persistence port for the append-only [`Event`] log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Appends `event` and returns the bus-assigned `seq`. Implementations
    /// must guarantee `seq` is monotonic per bus, not per project.
    async fn append(&self, event: &Event) -> CoreResult<u64>;
    async fn list_since(&self, project_id: Uuid, since_seq: u64) -> CoreResult<Vec<Event>>;
    async fn latest_seq(&self) -> CoreResult<u64>;
}
