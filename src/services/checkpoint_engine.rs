//! Atomic snapshot/restore/diff of project state plus the workspace ref (C7).
//!
//! `create`/`restore` hold a per-project exclusive lock for their duration
//! (`§5`); the actual git plumbing is out of scope for this core (§1), so
//! the workspace ref is captured and restored through the small
//! [`WorkspaceFacade`] seam rather than shelled out to directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Assignment, Checkpoint, MemoryItem, Project, Task};
use crate::domain::ports::{AssignmentRepository, CheckpointRepository, MemoryRepository, ProjectRepository, TaskRepository};

/// Captures and restores the workspace git ref alongside a checkpoint. The
/// actual git plumbing lives in the consuming application; this core only
/// stores/compares the ref strings it is given.
#[async_trait]
pub trait WorkspaceFacade: Send + Sync {
    async fn capture_ref(&self, project_id: Uuid) -> CoreResult<Option<String>>;
    async fn restore_ref(&self, project_id: Uuid, git_ref: &str) -> CoreResult<()>;
}

/// No-op facade for deployments (and tests) that don't track a workspace ref.
pub struct NullWorkspaceFacade;

#[async_trait]
impl WorkspaceFacade for NullWorkspaceFacade {
    async fn capture_ref(&self, _project_id: Uuid) -> CoreResult<Option<String>> {
        Ok(None)
    }

    async fn restore_ref(&self, _project_id: Uuid, _git_ref: &str) -> CoreResult<()> {
        Ok(())
    }
}

/// The entity collections captured in a checkpoint's `state_snapshot` blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectSnapshot {
    project: Project,
    tasks: Vec<Task>,
    assignments: Vec<Assignment>,
    memory_items: Vec<MemoryItem>,
}

/// Per-collection structural diff between two checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDiff {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    pub changed: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDiff {
    pub tasks: CollectionDiff,
    pub assignments: CollectionDiff,
    pub memory_items: CollectionDiff,
}

pub struct CheckpointEngine {
    checkpoints: Arc<dyn CheckpointRepository>,
    projects: Arc<dyn ProjectRepository>,
    tasks: Arc<dyn TaskRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    memory: Arc<dyn MemoryRepository>,
    workspace: Arc<dyn WorkspaceFacade>,
    project_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CheckpointEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        checkpoints: Arc<dyn CheckpointRepository>,
        projects: Arc<dyn ProjectRepository>,
        tasks: Arc<dyn TaskRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        memory: Arc<dyn MemoryRepository>,
        workspace: Arc<dyn WorkspaceFacade>,
    ) -> Self {
        Self {
            checkpoints,
            projects,
            tasks,
            assignments,
            memory,
            workspace,
            project_locks: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, project_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.project_locks.read().await.get(&project_id) {
            return lock.clone();
        }
        let mut locks = self.project_locks.write().await;
        locks.entry(project_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn snapshot_of(&self, project_id: Uuid) -> CoreResult<ProjectSnapshot> {
        let project = self.projects.get(project_id).await?;
        let tasks = self.tasks.list_by_project(project_id).await?;
        let assignments = self.assignments.list_by_project(project_id).await?;

        let agent_ids: HashSet<Uuid> = assignments.iter().map(|a| a.agent_id).collect();
        let mut memory_items = Vec::new();
        for agent_id in agent_ids {
            memory_items.extend(self.memory.list_by_agent(agent_id, project_id).await?);
        }

        Ok(ProjectSnapshot { project, tasks, assignments, memory_items })
    }

    /// Snapshots the project's current entity state and workspace ref into
    /// a new, immutable [`Checkpoint`].
    pub async fn create(&self, project_id: Uuid, name: impl Into<String>, description: impl Into<String>) -> CoreResult<Checkpoint> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let snapshot = self.snapshot_of(project_id).await?;
        let git_ref = self.workspace.capture_ref(project_id).await?;
        let blob = serde_json::to_vec(&snapshot).map_err(|e| CoreError::Other(e.into()))?;

        let checkpoint = Checkpoint::new(project_id, name, blob, git_ref).with_description(description);
        checkpoint.validate().map_err(CoreError::validation)?;
        self.checkpoints.create(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// Atomically rewrites project/task/memory rows (and the workspace, via
    /// [`WorkspaceFacade`]) to match `checkpoint_id`'s snapshot.
    pub async fn restore(&self, checkpoint_id: Uuid) -> CoreResult<()> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        let lock = self.lock_for(checkpoint.project_id).await;
        let _guard = lock.lock().await;

        let snapshot: ProjectSnapshot =
            serde_json::from_slice(&checkpoint.state_snapshot).map_err(|e| CoreError::Other(e.into()))?;

        let mut project = snapshot.project.clone();
        let current_project = self.projects.get(project.id).await?;
        project.version = current_project.version;
        self.projects.update(&project).await?;

        self.restore_tasks(checkpoint.project_id, &snapshot.tasks).await?;
        self.restore_assignments(checkpoint.project_id, &snapshot.assignments).await?;
        self.restore_memory(&snapshot).await?;

        if let Some(git_ref) = &checkpoint.git_ref {
            self.workspace.restore_ref(checkpoint.project_id, git_ref).await?;
        }

        Ok(())
    }

    async fn restore_tasks(&self, project_id: Uuid, target: &[Task]) -> CoreResult<()> {
        let current = self.tasks.list_by_project(project_id).await?;
        let target_ids: HashSet<Uuid> = target.iter().map(|t| t.id).collect();

        for existing in &current {
            if !target_ids.contains(&existing.id) {
                self.tasks.delete(existing.id).await?;
            }
        }

        for wanted in target {
            match current.iter().find(|t| t.id == wanted.id) {
                Some(live) => {
                    let mut restored = wanted.clone();
                    restored.version = live.version;
                    self.tasks.update(&restored).await?;
                }
                None => self.tasks.create(wanted).await?,
            }
        }
        Ok(())
    }

    async fn restore_assignments(&self, project_id: Uuid, target: &[Assignment]) -> CoreResult<()> {
        let current = self.assignments.list_by_project(project_id).await?;
        for wanted in target {
            match current.iter().find(|a| a.id == wanted.id) {
                Some(live) => {
                    let mut restored = wanted.clone();
                    restored.version = live.version;
                    self.assignments.update(&restored).await?;
                }
                None => self.assignments.create(wanted).await?,
            }
        }
        Ok(())
    }

    async fn restore_memory(&self, snapshot: &ProjectSnapshot) -> CoreResult<()> {
        let agent_ids: HashSet<Uuid> = snapshot.assignments.iter().map(|a| a.agent_id).collect();
        let target_ids: HashSet<Uuid> = snapshot.memory_items.iter().map(|m| m.id).collect();

        for agent_id in &agent_ids {
            let current = self.memory.list_by_agent(*agent_id, snapshot.project.id).await?;
            for existing in &current {
                if !target_ids.contains(&existing.id) {
                    self.memory.delete(existing.id).await?;
                }
            }
        }

        for wanted in &snapshot.memory_items {
            match self.memory.get(wanted.id).await {
                Ok(live) => {
                    let mut restored = wanted.clone();
                    restored.version = live.version;
                    self.memory.update(&restored).await?;
                }
                Err(_) => self.memory.create(wanted).await?,
            }
        }
        Ok(())
    }

    /// Field-wise structural diff of a checkpoint's snapshot vs. the
    /// project's current live state (§4.7: "diff(checkpoint_id) reports
    /// added/removed/modified rows vs. current project state").
    pub async fn diff(&self, checkpoint_id: Uuid) -> CoreResult<CheckpointDiff> {
        let checkpoint = self.checkpoints.get(checkpoint_id).await?;
        let snapshot: ProjectSnapshot =
            serde_json::from_slice(&checkpoint.state_snapshot).map_err(|e| CoreError::Other(e.into()))?;
        let current = self.snapshot_of(checkpoint.project_id).await?;

        Ok(CheckpointDiff {
            tasks: diff_tasks(&snapshot.tasks, &current.tasks),
            assignments: diff_assignments(&snapshot.assignments, &current.assignments),
            memory_items: diff_memory(&snapshot.memory_items, &current.memory_items),
        })
    }
}

fn diff_tasks(a: &[Task], b: &[Task]) -> CollectionDiff {
    let ids_a: HashMap<Uuid, &Task> = a.iter().map(|t| (t.id, t)).collect();
    let ids_b: HashMap<Uuid, &Task> = b.iter().map(|t| (t.id, t)).collect();
    collect_diff(&ids_a, &ids_b, |x, y| x.version != y.version || x.status != y.status)
}

fn diff_assignments(a: &[Assignment], b: &[Assignment]) -> CollectionDiff {
    let ids_a: HashMap<Uuid, &Assignment> = a.iter().map(|x| (x.id, x)).collect();
    let ids_b: HashMap<Uuid, &Assignment> = b.iter().map(|x| (x.id, x)).collect();
    collect_diff(&ids_a, &ids_b, |x, y| x.version != y.version || x.is_active != y.is_active)
}

fn diff_memory(a: &[MemoryItem], b: &[MemoryItem]) -> CollectionDiff {
    let ids_a: HashMap<Uuid, &MemoryItem> = a.iter().map(|x| (x.id, x)).collect();
    let ids_b: HashMap<Uuid, &MemoryItem> = b.iter().map(|x| (x.id, x)).collect();
    collect_diff(&ids_a, &ids_b, |x, y| x.version != y.version || x.tier != y.tier)
}

fn collect_diff<T>(
    a: &HashMap<Uuid, &T>,
    b: &HashMap<Uuid, &T>,
    changed: impl Fn(&T, &T) -> bool,
) -> CollectionDiff {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed_ids = Vec::new();

    for (id, item_b) in b {
        match a.get(id) {
            None => added.push(*id),
            Some(item_a) if changed(item_a, item_b) => changed_ids.push(*id),
            Some(_) => {}
        }
    }
    for id in a.keys() {
        if !b.contains_key(id) {
            removed.push(*id);
        }
    }

    CollectionDiff { added, removed, changed: changed_ids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteAssignmentRepository, SqliteCheckpointRepository, SqliteMemoryRepository,
        SqliteProjectRepository, SqliteTaskRepository,
    };
    use crate::domain::models::{Project, TaskStatus};

    async fn engine() -> (CheckpointEngine, Uuid) {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        let projects: Arc<dyn ProjectRepository> = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let project = Project::new("p", "user-1");
        projects.create(&project).await.unwrap();

        let engine = CheckpointEngine::new(
            Arc::new(SqliteCheckpointRepository::new(pool.clone())),
            projects,
            Arc::new(SqliteTaskRepository::new(pool.clone())),
            Arc::new(SqliteAssignmentRepository::new(pool.clone())),
            Arc::new(SqliteMemoryRepository::new(pool)),
            Arc::new(NullWorkspaceFacade),
        );
        (engine, project.id)
    }

    #[tokio::test]
    async fn restore_reverts_a_task_status_change() {
        let (engine, project_id) = engine().await;
        let mut task = Task::new(project_id, "implement thing", "backend");
        engine.tasks.create(&task).await.unwrap();

        let checkpoint = engine.create(project_id, "pre-mutation", "").await.unwrap();

        task.transition_to(TaskStatus::Assigned).unwrap();
        engine.tasks.update(&task).await.unwrap();
        let mutated = engine.tasks.get(task.id).await.unwrap();
        assert_eq!(mutated.status, TaskStatus::Assigned);

        engine.restore(checkpoint.id).await.unwrap();
        let restored = engine.tasks.get(task.id).await.unwrap();
        assert_eq!(restored.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn diff_reports_changed_task_against_current_state() {
        let (engine, project_id) = engine().await;
        let mut task = Task::new(project_id, "implement thing", "backend");
        engine.tasks.create(&task).await.unwrap();

        let checkpoint = engine.create(project_id, "before", "").await.unwrap();
        task.transition_to(TaskStatus::Assigned).unwrap();
        engine.tasks.update(&task).await.unwrap();

        let diff = engine.diff(checkpoint.id).await.unwrap();
        assert_eq!(diff.tasks.changed, vec![task.id]);
        assert!(diff.tasks.added.is_empty());
        assert!(diff.tasks.removed.is_empty());
    }

    #[tokio::test]
    async fn diff_reports_task_added_since_checkpoint() {
        let (engine, project_id) = engine().await;
        let first = Task::new(project_id, "implement thing", "backend");
        engine.tasks.create(&first).await.unwrap();

        let checkpoint = engine.create(project_id, "before", "").await.unwrap();

        let second = Task::new(project_id, "write docs", "backend");
        engine.tasks.create(&second).await.unwrap();

        let diff = engine.diff(checkpoint.id).await.unwrap();
        assert_eq!(diff.tasks.added, vec![second.id]);
        assert!(diff.tasks.removed.is_empty());
        assert!(diff.tasks.changed.is_empty());
    }
}
