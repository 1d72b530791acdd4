//! Single-flight, persistent cache over the review gate.
//!
//! Keyed by `(task_id, fingerprint)`. A repository hit short-circuits the
//! producer entirely; concurrent callers for the same key while a review is
//! in flight join the same [`Shared`] future rather than re-running it.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::ReviewReport;
use crate::domain::ports::ReviewRepository;

/// Produces a fresh review for a task's current output. The real
/// implementation (static analysis, an LLM reviewer, or both) is supplied by
/// the consuming application; this crate ships only the cache semantics.
#[async_trait]
pub trait ReviewProducer: Send + Sync {
    async fn produce(
        &self,
        task_id: Uuid,
        fingerprint: &str,
        workspace_root: &Path,
    ) -> CoreResult<ReviewReport>;
}

type ReviewFuture = Shared<Pin<Box<dyn Future<Output = Result<ReviewReport, String>> + Send>>>;

pub struct ReviewCache {
    repository: Arc<dyn ReviewRepository>,
    producer: Arc<dyn ReviewProducer>,
    in_flight: Mutex<HashMap<(Uuid, String), ReviewFuture>>,
}

impl ReviewCache {
    pub fn new(repository: Arc<dyn ReviewRepository>, producer: Arc<dyn ReviewProducer>) -> Self {
        Self {
            repository,
            producer,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached report for `(task_id, fingerprint)` if one exists,
    /// otherwise produces and persists a new one, joining any in-flight
    /// production for the same key.
    pub async fn review(
        &self,
        task_id: Uuid,
        fingerprint: &str,
        workspace_root: &Path,
    ) -> CoreResult<ReviewReport> {
        if let Some(cached) = self.repository.find_by_fingerprint(task_id, fingerprint).await? {
            return Ok(cached);
        }

        let key = (task_id, fingerprint.to_string());
        let fut = {
            let mut guard = self.in_flight.lock().await;
            if let Some(shared) = guard.get(&key) {
                shared.clone()
            } else {
                let producer = self.producer.clone();
                let workspace_root = workspace_root.to_path_buf();
                let fingerprint_owned = fingerprint.to_string();
                let shared: ReviewFuture = async move {
                    producer
                        .produce(task_id, &fingerprint_owned, &workspace_root)
                        .await
                        .map_err(|e| e.to_string())
                }
                .boxed()
                .shared();
                guard.insert(key.clone(), shared.clone());
                shared
            }
        };

        let result = fut.await;
        self.in_flight.lock().await.remove(&key);

        match result {
            Ok(report) => {
                self.repository.create(&report).await?;
                Ok(report)
            }
            Err(message) => Err(CoreError::Other(anyhow::anyhow!(message))),
        }
    }

    /// Drops any in-flight production for `(task_id, fingerprint)`. Called
    /// when a write to a covered file invalidates a cached review before it
    /// would naturally be superseded by a new fingerprint.
    pub async fn invalidate(&self, task_id: Uuid, fingerprint: &str) {
        self.in_flight
            .lock()
            .await
            .remove(&(task_id, fingerprint.to_string()));
    }
}

/// Default producer for deployments that don't wire in a real reviewer
/// (static analysis, an LLM reviewer, or both are the consuming
/// application's responsibility -- this core only ships cache semantics).
/// Always reports a clean review with no issues.
pub struct NoOpReviewProducer;

#[async_trait]
impl ReviewProducer for NoOpReviewProducer {
    async fn produce(&self, task_id: Uuid, fingerprint: &str, _workspace_root: &Path) -> CoreResult<ReviewReport> {
        Ok(ReviewReport::new(task_id, fingerprint, Vec::new()))
    }
}
