//! Per-agent worker loop (C9): `next_task_for -> hydrate -> generate -> apply
//! -> finalize`. One [`AgentRuntime::run_once`] call drives a single
//! iteration for a single agent; the intended deployment wraps it in a
//! `loop` inside a dedicated `tokio::task` per agent (§5) so the LLM call
//! remains each worker's sole long-suspension point.
//!
//! Transient LLM failures are retried with exponential backoff following
//! the reference crate's hand-rolled `AgentExecutor::execute_with_retry`
//! idiom; retry exhaustion (or a permanent LLM failure) is converted into a
//! SYNC blocker rather than silently failing the task, per §4.9.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{Agent, AgentStatus, Blocker, BlockerKind, BlockerSeverity, Task};
use crate::domain::ports::{AgentRepository, LlmCompletion, LlmSubstrate};
use crate::services::blocker_queue::BlockerQueue;
use crate::services::context_manager::ContextManager;
use crate::services::quality_gate::QualityGateRunner;
use crate::services::scheduler::Scheduler;

/// A single file edit an agent's completion asked to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub contents: String,
}

/// Parses a completion's text as a JSON array of [`FileChange`]. A
/// completion that isn't a file-change array (plain prose, a clarifying
/// question, an echoed prompt in tests) yields no changes rather than an
/// error -- not every turn edits files.
fn parse_file_changes(text: &str) -> Vec<FileChange> {
    serde_json::from_str(text).unwrap_or_default()
}

/// Applies an agent's produced file changes to a task's workspace. The real
/// git plumbing behind this is out of scope (§1); this crate ships a plain
/// filesystem writer and a no-op test double.
#[async_trait]
pub trait FileChangeApplier: Send + Sync {
    async fn apply(&self, workspace_root: &Path, changes: &[FileChange]) -> CoreResult<()>;
}

/// Writes each change under `workspace_root`, creating parent directories as needed.
pub struct FsFileChangeApplier;

#[async_trait]
impl FileChangeApplier for FsFileChangeApplier {
    async fn apply(&self, workspace_root: &Path, changes: &[FileChange]) -> CoreResult<()> {
        for change in changes {
            let target = workspace_root.join(&change.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| CoreError::Other(e.into()))?;
            }
            tokio::fs::write(&target, &change.contents).await.map_err(|e| CoreError::Other(e.into()))?;
        }
        Ok(())
    }
}

/// No-op applier for deployments (and tests) that don't write to a real workspace.
pub struct NullFileChangeApplier;

#[async_trait]
impl FileChangeApplier for NullFileChangeApplier {
    async fn apply(&self, _workspace_root: &Path, _changes: &[FileChange]) -> CoreResult<()> {
        Ok(())
    }
}

/// Outcome of one worker iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// No ready task was available for this agent.
    NoWork,
    /// The claimed task ran the full pipeline and was handed to
    /// [`Scheduler::on_task_finalized`] -- which may have completed it,
    /// self-corrected it, or escalated it to a blocker; callers that care
    /// which should re-read the task.
    Finalized { task_id: Uuid },
    /// An infrastructure failure (LLM retries exhausted, a permanent LLM
    /// error) was converted into a SYNC blocker before the gate pipeline
    /// ever ran.
    RaisedBlocker { task_id: Uuid, blocker_id: Uuid },
}

pub struct AgentRuntime {
    agents: Arc<dyn AgentRepository>,
    substrate: Arc<dyn LlmSubstrate>,
    context: Arc<ContextManager>,
    blockers: Arc<BlockerQueue>,
    gates: Arc<QualityGateRunner>,
    scheduler: Arc<Scheduler>,
    applier: Arc<dyn FileChangeApplier>,
    model: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        substrate: Arc<dyn LlmSubstrate>,
        context: Arc<ContextManager>,
        blockers: Arc<BlockerQueue>,
        gates: Arc<QualityGateRunner>,
        scheduler: Arc<Scheduler>,
        applier: Arc<dyn FileChangeApplier>,
        model: impl Into<String>,
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            agents,
            substrate,
            context,
            blockers,
            gates,
            scheduler,
            applier,
            model: model.into(),
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Runs one iteration for `agent_id` within `project_id`: claims the
    /// next ready task (if any), hydrates context, calls the LLM with
    /// retry, applies file changes, runs the quality-gate pipeline, and
    /// finalizes through the scheduler.
    #[tracing::instrument(skip(self, workspace_root), fields(agent_id = %agent_id, project_id = %project_id))]
    pub async fn run_once(&self, agent_id: Uuid, project_id: Uuid, workspace_root: &Path) -> CoreResult<AgentOutcome> {
        let Some(task) = self.scheduler.next_task_for(agent_id, project_id).await? else {
            return Ok(AgentOutcome::NoWork);
        };

        self.set_agent_status(agent_id, AgentStatus::Working).await?;
        let task = self.scheduler.start_task_execution(task.id).await?;

        let user_prompt = self.build_prompt(agent_id, &task).await?;
        let system_prompt = format!("You are a {} agent working on task \"{}\".", task.agent_type, task.title);

        let completion = match self.complete_with_retry(&system_prompt, &user_prompt).await {
            Ok(completion) => completion,
            Err(error) => return self.escalate_infrastructure_failure(&task, agent_id, error).await,
        };

        let changes = parse_file_changes(&completion.text);
        self.applier.apply(workspace_root, &changes).await?;

        self.context
            .record(
                agent_id,
                task.project_id,
                format!("task:{}:output", task.id),
                completion.text.clone(),
                completion.output_tokens,
                0.5,
            )
            .await?;
        // Best-effort: a budget violation here just means this round's
        // output stays HOT a little longer, not a failed task.
        let _ = self.context.retier(agent_id).await;

        let fingerprint = Self::fingerprint(&task, &changes);
        let report = self.gates.run(task.id, &fingerprint, workspace_root).await?;
        self.scheduler.on_task_finalized(task.id, &report).await?;

        self.release_agent_if_working(agent_id).await?;
        Ok(AgentOutcome::Finalized { task_id: task.id })
    }

    async fn build_prompt(&self, agent_id: Uuid, task: &Task) -> CoreResult<String> {
        let memory = self.context.retrieve(agent_id, None).await?;
        let hydrated = memory.iter().map(|m| format!("- {}: {}", m.key, m.value)).collect::<Vec<_>>().join("\n");
        Ok(format!(
            "# Context\n{hydrated}\n\n# Task\n{}\n{}",
            task.title, task.description
        ))
    }

    async fn complete_with_retry(&self, system_prompt: &str, user_prompt: &str) -> CoreResult<LlmCompletion> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            match self.substrate.complete(&self.model, system_prompt, user_prompt).await {
                Ok(completion) => return Ok(completion),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        error = %error,
                        "retrying transient LLM failure"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn escalate_infrastructure_failure(&self, task: &Task, agent_id: Uuid, error: CoreError) -> CoreResult<AgentOutcome> {
        let blocker = Blocker::new(
            task.id,
            agent_id,
            BlockerKind::Sync,
            BlockerSeverity::Critical,
            format!("agent runtime exhausted retries: {error}"),
        );
        let blocker = self.blockers.raise(blocker).await?;
        self.scheduler.escalate_to_blocker(task.id).await?;
        self.set_agent_status(agent_id, AgentStatus::Blocked).await?;
        Ok(AgentOutcome::RaisedBlocker { task_id: task.id, blocker_id: blocker.id })
    }

    async fn set_agent_status(&self, agent_id: Uuid, target: AgentStatus) -> CoreResult<Agent> {
        let mut agent = self.agents.get(agent_id).await?;
        if agent.status != target && agent.status.can_transition_to(target) {
            agent.transition_to(target).map_err(CoreError::validation)?;
            self.agents.update(&agent).await?;
        }
        Ok(agent)
    }

    async fn release_agent_if_working(&self, agent_id: Uuid) -> CoreResult<()> {
        let agent = self.agents.get(agent_id).await?;
        if agent.status == AgentStatus::Working {
            self.set_agent_status(agent_id, AgentStatus::Idle).await?;
        }
        Ok(())
    }

    /// Stable hash over the task's identity and the file changes its latest
    /// completion produced, used as the review cache's key. No dedicated
    /// hashing crate is pulled in for this -- it is an internal cache key,
    /// not a content-addressed artifact, so `std::hash` suffices.
    fn fingerprint(task: &Task, changes: &[FileChange]) -> String {
        let mut hasher = DefaultHasher::new();
        task.id.hash(&mut hasher);
        task.description.hash(&mut hasher);
        for change in changes {
            change.path.hash(&mut hasher);
            change.contents.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteAgentRepository, SqliteAssignmentRepository, SqliteBlockerRepository,
        SqliteEventRepository, SqliteMemoryRepository, SqliteProjectRepository, SqliteReviewRepository,
        SqliteTaskRepository,
    };
    use crate::adapters::substrate::MockSubstrate;
    use crate::domain::models::{AgentType, IssueSeverity, ReviewIssue, ReviewReport, TaskStatus};
    use crate::domain::ports::{ProjectRepository, ReviewRepository, TaskRepository as _};
    use crate::services::event_bus::EventBus;
    use crate::services::gates::{CoverageGate, LintGate, TestsGate, TypeCheckGate};
    use crate::services::review_cache::{ReviewCache, ReviewProducer};
    use async_trait::async_trait as at;

    struct CleanReviewProducer;

    #[at]
    impl ReviewProducer for CleanReviewProducer {
        async fn produce(&self, task_id: Uuid, fingerprint: &str, _workspace_root: &Path) -> CoreResult<ReviewReport> {
            Ok(ReviewReport::new(task_id, fingerprint, Vec::new()))
        }
    }

    struct AlwaysCriticalReviewProducer;

    #[at]
    impl ReviewProducer for AlwaysCriticalReviewProducer {
        async fn produce(&self, task_id: Uuid, fingerprint: &str, _workspace_root: &Path) -> CoreResult<ReviewReport> {
            Ok(ReviewReport::new(
                task_id,
                fingerprint,
                vec![ReviewIssue { severity: IssueSeverity::Critical, message: "bug".into(), location: None }],
            ))
        }
    }

    struct Harness {
        runtime: AgentRuntime,
        mock: Arc<MockSubstrate>,
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn crate::domain::ports::TaskRepository>,
        blockers: Arc<BlockerQueue>,
        agent_id: Uuid,
        project_id: Uuid,
        task_id: Uuid,
    }

    async fn harness(substrate_responses: Vec<String>, review_producer: Arc<dyn ReviewProducer>) -> Harness {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();

        let projects = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let agents_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let assignments = Arc::new(SqliteAssignmentRepository::new(pool.clone()));
        let tasks: Arc<dyn crate::domain::ports::TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let blockers = Arc::new(BlockerQueue::new(Arc::new(SqliteBlockerRepository::new(pool.clone()))));
        let events = Arc::new(EventBus::new(Arc::new(SqliteEventRepository::new(pool.clone()))));
        let context = Arc::new(ContextManager::new(Arc::new(SqliteMemoryRepository::new(pool.clone())), 8_000, 32_000, 0.1));

        let review_cache = Arc::new(ReviewCache::new(Arc::new(SqliteReviewRepository::new(pool.clone())), review_producer));
        let gates = Arc::new(QualityGateRunner::new(
            TestsGate::new("true", vec![]),
            TypeCheckGate::new("true", vec![]),
            CoverageGate::new("echo", vec!["100.0% coverage".to_string()], 50.0),
            LintGate::new("true", vec![]),
            review_cache,
            Duration::from_secs(30),
        ));

        let scheduler = Arc::new(Scheduler::new(
            projects.clone(),
            agents_repo.clone(),
            assignments.clone(),
            tasks.clone(),
            blockers.clone(),
            events,
        ));

        let project = crate::domain::models::Project::new("p", "user-1");
        projects.create(&project).await.unwrap();
        scheduler.start(project.id).await.unwrap();

        let agent = Agent::new(AgentType::Backend, "anthropic");
        agents_repo.create(&agent).await.unwrap();
        scheduler.assign_agent(project.id, agent.id, "implementer").await.unwrap();

        let task = Task::new(project.id, "write handler", "backend");
        tasks.create(&task).await.unwrap();

        let mock = Arc::new(MockSubstrate::new(substrate_responses));
        let runtime = AgentRuntime::new(
            agents_repo.clone(),
            mock.clone(),
            context,
            blockers.clone(),
            gates,
            scheduler,
            Arc::new(NullFileChangeApplier),
            "claude-sonnet",
            3,
            Duration::from_millis(5),
            Duration::from_millis(40),
        );

        Harness { runtime, mock, agents: agents_repo, tasks, blockers, agent_id: agent.id, project_id: project.id, task_id: task.id }
    }

    #[tokio::test]
    async fn completes_a_task_end_to_end_on_a_clean_pass() {
        let h = harness(vec!["done".to_string()], Arc::new(CleanReviewProducer)).await;
        let workspace = tempfile::tempdir().unwrap();

        let outcome = h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Finalized { task_id: h.task_id });

        let task = h.tasks.get(h.task_id).await.unwrap();
        assert_eq!(task.status, crate::domain::models::TaskStatus::Completed);
        let agent = h.agents.get(h.agent_id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn escalates_to_a_blocker_when_review_finds_a_critical_issue() {
        let h = harness(vec!["done".to_string()], Arc::new(AlwaysCriticalReviewProducer)).await;
        let workspace = tempfile::tempdir().unwrap();

        let outcome = h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Finalized { task_id: h.task_id });

        let task = h.tasks.get(h.task_id).await.unwrap();
        assert_eq!(task.status, crate::domain::models::TaskStatus::Blocked);
        let blockers = h.blockers.list_for_task(h.task_id).await.unwrap();
        assert_eq!(blockers.len(), 1);
    }

    #[tokio::test]
    async fn no_work_when_no_ready_task_matches_agent_type() {
        let h = harness(vec!["done".to_string()], Arc::new(CleanReviewProducer)).await;

        // Drain the one ready (backend) task first.
        let workspace = tempfile::tempdir().unwrap();
        h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();

        let outcome = h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();
        assert_eq!(outcome, AgentOutcome::NoWork);
    }

    #[tokio::test]
    async fn transient_llm_failure_retries_then_succeeds() {
        let h = harness(vec!["done".to_string()], Arc::new(CleanReviewProducer)).await;

        // Force the substrate's very next call to fail transiently; the
        // retry loop should recover and still finalize.
        h.mock.fail_next_call(true);

        let workspace = tempfile::tempdir().unwrap();
        let outcome = h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();
        assert_eq!(outcome, AgentOutcome::Finalized { task_id: h.task_id });
        assert_eq!(h.mock.call_count(), 2);
    }

    #[tokio::test]
    async fn permanent_llm_failure_raises_a_blocker_without_running_gates() {
        let h = harness(vec!["done".to_string()], Arc::new(CleanReviewProducer)).await;
        h.mock.fail_next_call(false);

        let workspace = tempfile::tempdir().unwrap();
        let outcome = h.runtime.run_once(h.agent_id, h.project_id, workspace.path()).await.unwrap();
        match outcome {
            AgentOutcome::RaisedBlocker { task_id: t, .. } => assert_eq!(t, h.task_id),
            other => panic!("expected RaisedBlocker, got {other:?}"),
        }

        let agent = h.agents.get(h.agent_id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Blocked);

        let task = h.tasks.get(h.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Blocked, "a task with an open SYNC blocker must be blocked");
    }

    #[test]
    fn fingerprint_changes_with_file_contents() {
        let task = Task::new(Uuid::new_v4(), "t", "backend");
        let a = vec![FileChange { path: "src/lib.rs".into(), contents: "fn a() {}".into() }];
        let b = vec![FileChange { path: "src/lib.rs".into(), contents: "fn b() {}".into() }];
        assert_ne!(AgentRuntime::fingerprint(&task, &a), AgentRuntime::fingerprint(&task, &b));
    }

    #[test]
    fn parse_file_changes_ignores_non_json_completions() {
        assert!(parse_file_changes("just talking, no edits").is_empty());
    }

    #[test]
    fn parse_file_changes_reads_a_json_array() {
        let text = r#"[{"path": "src/lib.rs", "contents": "fn a() {}"}]"#;
        let changes = parse_file_changes(text);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "src/lib.rs");
    }
}
