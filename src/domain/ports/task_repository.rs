use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::{Task, TaskStatus};

/// Persistence port for [`Task`].
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Task>;
    /// Optimistic-locked update: fails with `ConcurrencyConflict` if
    /// `task.version` does not match the stored row's version.
    async fn update(&self, task: &Task) -> CoreResult<()>;
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
    async fn list_by_project(&self, project_id: Uuid) -> CoreResult<Vec<Task>>;
    async fn list_by_status(&self, project_id: Uuid, status: TaskStatus) -> CoreResult<Vec<Task>>;
    async fn list_by_assignee(&self, agent_id: Uuid) -> CoreResult<Vec<Task>>;

    /// Tasks whose dependencies are all completed and whose status is
    /// `pending`, ordered `(priority DESC, created_at ASC, id ASC)`.
    async fn get_ready_tasks(&self, project_id: Uuid, limit: u32) -> CoreResult<Vec<Task>>;

    /// Atomically claims a ready task for `agent_id`, transitioning it to
    /// `assigned`. Returns `None` if no ready task remains uncontested.
    async fn claim_next_ready_task(&self, project_id: Uuid, agent_id: Uuid) -> CoreResult<Option<Task>>;

    async fn find_by_idempotency_key(&self, project_id: Uuid, key: &str) -> CoreResult<Option<Task>>;
}
