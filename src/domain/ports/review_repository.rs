use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::ReviewReport;

/// Persistence port for [`ReviewReport`], keyed by `(task_id, fingerprint)`.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, report: &ReviewReport) -> CoreResult<()>;
    async fn find_by_fingerprint(&self, task_id: Uuid, fingerprint: &str) -> CoreResult<Option<ReviewReport>>;
    async fn list_by_task(&self, task_id: Uuid) -> CoreResult<Vec<ReviewReport>>;
}
