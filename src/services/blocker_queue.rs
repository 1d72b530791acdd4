//! Human-in-the-loop blocker routing and resolution (C4).
//!
//! A SYNC blocker's raiser waits on a oneshot channel; `resolve` records the
//! answer then wakes exactly one waiter. A deadline, when attached, races
//! the wait via `tokio::time::sleep` and auto-resolves with a timeout
//! sentinel if it elapses first.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::Blocker;
use crate::domain::ports::BlockerRepository;

/// How a SYNC wait concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockerResolution {
    Answered(String),
    TimedOut,
    /// The owning task failed or was deleted before the blocker was answered.
    TaskOutcomeSentinel,
}

pub struct BlockerQueue {
    repository: Arc<dyn BlockerRepository>,
    waiters: Mutex<HashMap<Uuid, oneshot::Sender<BlockerResolution>>>,
}

impl BlockerQueue {
    pub fn new(repository: Arc<dyn BlockerRepository>) -> Self {
        Self { repository, waiters: Mutex::new(HashMap::new()) }
    }

    /// Persists a newly raised blocker. For ASYNC blockers the caller
    /// continues without waiting; for SYNC blockers the caller should
    /// follow up with [`Self::wait`].
    pub async fn raise(&self, blocker: Blocker) -> CoreResult<Blocker> {
        self.repository.create(&blocker).await?;
        Ok(blocker)
    }

    /// Blocks until `blocker_id` is resolved, abandoned, or its deadline
    /// elapses (whichever comes first). Registers exactly one waiter per
    /// call; a second concurrent `wait` on the same blocker replaces the
    /// first registration, which is a caller bug, not a queue invariant.
    pub async fn wait(&self, blocker_id: Uuid) -> CoreResult<BlockerResolution> {
        let blocker = self.repository.get(blocker_id).await?;
        if blocker.status.is_terminal() {
            return Ok(match blocker.answer {
                Some(answer) => BlockerResolution::Answered(answer),
                None => BlockerResolution::TimedOut,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(blocker_id, tx);

        let resolution = match blocker.deadline {
            Some(deadline) => {
                let now = chrono::Utc::now();
                let remaining = (deadline - now).to_std().unwrap_or(std::time::Duration::ZERO);
                tokio::select! {
                    received = rx => received.unwrap_or(BlockerResolution::TimedOut),
                    _ = tokio::time::sleep(remaining) => {
                        self.waiters.lock().await.remove(&blocker_id);
                        self.expire(blocker_id).await?;
                        BlockerResolution::TimedOut
                    }
                }
            }
            None => rx.await.unwrap_or(BlockerResolution::TimedOut),
        };

        Ok(resolution)
    }

    /// Records `answer`, persists the resolved blocker, and wakes the one
    /// registered waiter (if any — an ASYNC blocker may have none).
    pub async fn resolve(&self, blocker_id: Uuid, answer: impl Into<String>) -> CoreResult<Blocker> {
        let answer = answer.into();
        let mut blocker = self.repository.get(blocker_id).await?;
        blocker.resolve(answer.clone()).map_err(CoreError::validation)?;
        self.repository.update(&blocker).await?;

        if let Some(waiter) = self.waiters.lock().await.remove(&blocker_id) {
            let _ = waiter.send(BlockerResolution::Answered(answer));
        }
        Ok(blocker)
    }

    /// Abandons the blocker and wakes its waiter with [`BlockerResolution::TaskOutcomeSentinel`],
    /// used when the owning task fails or is deleted before an answer arrives.
    pub async fn cancel_for_task_outcome(&self, blocker_id: Uuid) -> CoreResult<Blocker> {
        let mut blocker = self.repository.get(blocker_id).await?;
        if !blocker.status.is_terminal() {
            blocker.abandon().map_err(CoreError::validation)?;
            self.repository.update(&blocker).await?;
        }

        if let Some(waiter) = self.waiters.lock().await.remove(&blocker_id) {
            let _ = waiter.send(BlockerResolution::TaskOutcomeSentinel);
        }
        Ok(blocker)
    }

    async fn expire(&self, blocker_id: Uuid) -> CoreResult<()> {
        let mut blocker = self.repository.get(blocker_id).await?;
        if !blocker.status.is_terminal() {
            blocker.abandon().map_err(CoreError::validation)?;
            self.repository.update(&blocker).await?;
        }
        Ok(())
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> CoreResult<Vec<Blocker>> {
        self.repository.list_by_task(task_id).await
    }

    /// Sweeps every open blocker past its deadline, abandoning each and
    /// waking its waiter. Intended to run on a periodic tick alongside the
    /// scheduler's dispatch loop, independent of any single `wait` call's
    /// own deadline race.
    pub async fn expire_overdue(&self) -> CoreResult<Vec<Uuid>> {
        let overdue = self.repository.list_past_deadline().await?;
        let mut expired = Vec::with_capacity(overdue.len());
        for blocker in overdue {
            if blocker.status.is_terminal() {
                continue;
            }
            self.expire(blocker.id).await?;
            if let Some(waiter) = self.waiters.lock().await.remove(&blocker.id) {
                let _ = waiter.send(BlockerResolution::TimedOut);
            }
            expired.push(blocker.id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteBlockerRepository, SqliteProjectRepository, SqliteTaskRepository,
    };
    use crate::domain::models::{BlockerKind, BlockerSeverity, Project, Task};
    use crate::domain::ports::{ProjectRepository, TaskRepository};
    use std::sync::Arc as StdArc;

    async fn queue_with_task() -> (BlockerQueue, Uuid) {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let project = Project::new("p", "user-1");
        SqliteProjectRepository::new(pool.clone()).create(&project).await.unwrap();
        let task_repo = SqliteTaskRepository::new(pool.clone());
        let task = Task::new(project.id, "t", "backend");
        task_repo.create(&task).await.unwrap();
        (BlockerQueue::new(StdArc::new(SqliteBlockerRepository::new(pool))), task.id)
    }

    #[tokio::test]
    async fn resolve_wakes_the_waiter_with_the_answer() {
        let (queue, task_id) = queue_with_task().await;
        let blocker = Blocker::new(task_id, Uuid::new_v4(), BlockerKind::Sync, BlockerSeverity::High, "which approach?");
        let blocker = queue.raise(blocker).await.unwrap();

        let queue = Arc::new(queue);
        let waiting = {
            let q = queue.clone();
            let id = blocker.id;
            tokio::spawn(async move { q.wait(id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        queue.resolve(blocker.id, "use approach B").await.unwrap();

        let resolution = waiting.await.unwrap().unwrap();
        assert_eq!(resolution, BlockerResolution::Answered("use approach B".to_string()));
    }

    #[tokio::test]
    async fn deadline_elapsing_times_out_the_waiter() {
        let (queue, task_id) = queue_with_task().await;
        let blocker = Blocker::new(task_id, Uuid::new_v4(), BlockerKind::Sync, BlockerSeverity::Low, "?")
            .with_deadline(chrono::Utc::now() + chrono::Duration::milliseconds(20));
        let blocker = queue.raise(blocker).await.unwrap();

        let resolution = queue.wait(blocker.id).await.unwrap();
        assert_eq!(resolution, BlockerResolution::TimedOut);
    }

    #[tokio::test]
    async fn cancel_for_task_outcome_wakes_waiter_with_sentinel() {
        let (queue, task_id) = queue_with_task().await;
        let blocker = Blocker::new(task_id, Uuid::new_v4(), BlockerKind::Sync, BlockerSeverity::Critical, "?");
        let blocker = queue.raise(blocker).await.unwrap();

        let queue = Arc::new(queue);
        let waiting = {
            let q = queue.clone();
            let id = blocker.id;
            tokio::spawn(async move { q.wait(id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        queue.cancel_for_task_outcome(blocker.id).await.unwrap();

        let resolution = waiting.await.unwrap().unwrap();
        assert_eq!(resolution, BlockerResolution::TaskOutcomeSentinel);
    }
}
