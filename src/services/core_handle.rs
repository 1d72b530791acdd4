//! Wires repositories, services, and the per-agent runtime into a single
//! handle. The CLI adapter (and tests) construct one `CoreHandle` per
//! process/test and drive everything else through it.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    create_pool, create_test_pool, ConnectionError, Migrator, PoolConfig, SqliteAgentRepository,
    SqliteAssignmentRepository, SqliteBlockerRepository, SqliteCheckpointRepository, SqliteEventRepository,
    SqliteMemoryRepository, SqliteProjectRepository, SqliteReviewRepository, SqliteTaskRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{
    AgentRepository, AssignmentRepository, BlockerRepository, CheckpointRepository, EventRepository, LlmSubstrate,
    MemoryRepository, ProjectRepository, ReviewRepository, TaskRepository,
};
use crate::services::agent_runtime::{AgentRuntime, FileChangeApplier, FsFileChangeApplier};
use crate::services::blocker_queue::BlockerQueue;
use crate::services::checkpoint_engine::{CheckpointEngine, NullWorkspaceFacade, WorkspaceFacade};
use crate::services::context_manager::ContextManager;
use crate::services::event_bus::EventBus;
use crate::services::gates::{CoverageGate, LintGate, TestsGate, TypeCheckGate};
use crate::services::quality_gate::QualityGateRunner;
use crate::services::review_cache::{NoOpReviewProducer, ReviewCache, ReviewProducer};
use crate::services::scheduler::Scheduler;

/// Everything downstream of a loaded [`Config`]: open repositories, the
/// service layer, and the per-agent runtime, assembled in dependency order.
///
/// The LLM substrate, review producer, and workspace facade are the seams
/// this core deliberately leaves to the consuming application (§1); callers
/// supply real implementations, or fall back to the bundled no-op/mock
/// doubles via [`CoreHandle::new`]'s defaults.
pub struct CoreHandle {
    pub pool: SqlitePool,
    pub config: Config,

    pub projects: Arc<dyn ProjectRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub blockers_repo: Arc<dyn BlockerRepository>,
    pub events_repo: Arc<dyn EventRepository>,
    pub memory_repo: Arc<dyn MemoryRepository>,
    pub checkpoints_repo: Arc<dyn CheckpointRepository>,
    pub reviews_repo: Arc<dyn ReviewRepository>,

    pub event_bus: Arc<EventBus>,
    pub context: Arc<ContextManager>,
    pub blocker_queue: Arc<BlockerQueue>,
    pub review_cache: Arc<ReviewCache>,
    pub quality_gates: Arc<QualityGateRunner>,
    pub scheduler: Arc<Scheduler>,
    pub checkpoint_engine: Arc<CheckpointEngine>,
    pub agent_runtime: Arc<AgentRuntime>,
}

impl CoreHandle {
    /// Opens (creating if missing) the database at `config.database_path`,
    /// runs pending migrations, and wires the full service layer.
    pub async fn open(
        config: Config,
        substrate: Arc<dyn LlmSubstrate>,
        review_producer: Option<Arc<dyn ReviewProducer>>,
        workspace: Option<Arc<dyn WorkspaceFacade>>,
        applier: Option<Arc<dyn FileChangeApplier>>,
    ) -> Result<Self, ConnectionError> {
        let pool = create_pool(&config.database_path, &PoolConfig::default()).await?;
        Migrator::run(&pool).await.map_err(ConnectionError::Verification)?;
        Ok(Self::assemble(pool, config, substrate, review_producer, workspace, applier))
    }

    /// Builds a handle over an isolated in-memory database, migrated and
    /// ready to use. Intended for tests and examples.
    pub async fn open_in_memory(
        config: Config,
        substrate: Arc<dyn LlmSubstrate>,
        review_producer: Option<Arc<dyn ReviewProducer>>,
        workspace: Option<Arc<dyn WorkspaceFacade>>,
        applier: Option<Arc<dyn FileChangeApplier>>,
    ) -> Result<Self, ConnectionError> {
        let pool = create_test_pool().await?;
        Migrator::run(&pool).await.map_err(ConnectionError::Verification)?;
        Ok(Self::assemble(pool, config, substrate, review_producer, workspace, applier))
    }

    fn assemble(
        pool: SqlitePool,
        config: Config,
        substrate: Arc<dyn LlmSubstrate>,
        review_producer: Option<Arc<dyn ReviewProducer>>,
        workspace: Option<Arc<dyn WorkspaceFacade>>,
        applier: Option<Arc<dyn FileChangeApplier>>,
    ) -> Self {
        let projects: Arc<dyn ProjectRepository> = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let assignments: Arc<dyn AssignmentRepository> = Arc::new(SqliteAssignmentRepository::new(pool.clone()));
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let blockers_repo: Arc<dyn BlockerRepository> = Arc::new(SqliteBlockerRepository::new(pool.clone()));
        let events_repo: Arc<dyn EventRepository> = Arc::new(SqliteEventRepository::new(pool.clone()));
        let memory_repo: Arc<dyn MemoryRepository> = Arc::new(SqliteMemoryRepository::new(pool.clone()));
        let checkpoints_repo: Arc<dyn CheckpointRepository> = Arc::new(SqliteCheckpointRepository::new(pool.clone()));
        let reviews_repo: Arc<dyn ReviewRepository> = Arc::new(SqliteReviewRepository::new(pool.clone()));

        let event_bus = Arc::new(EventBus::new(events_repo.clone()));
        let context = Arc::new(ContextManager::new(
            memory_repo.clone(),
            config.context_hot_budget_tokens,
            config.context_warm_budget_tokens,
            config.flash_save_headroom_ratio,
        ));
        let blocker_queue = Arc::new(BlockerQueue::new(blockers_repo.clone()));

        let review_producer = review_producer.unwrap_or_else(|| Arc::new(NoOpReviewProducer));
        let review_cache = Arc::new(ReviewCache::new(reviews_repo.clone(), review_producer));

        let gate_timeout = Duration::from_secs(config.gate_timeout_seconds);
        let quality_gates = Arc::new(QualityGateRunner::new(
            TestsGate::cargo_test(),
            TypeCheckGate::cargo_check(),
            CoverageGate::cargo_tarpaulin(config.min_coverage_percent),
            LintGate::cargo_clippy(),
            review_cache.clone(),
            gate_timeout,
        ));

        let scheduler = Arc::new(Scheduler::new(
            projects.clone(),
            agents.clone(),
            assignments.clone(),
            tasks.clone(),
            blocker_queue.clone(),
            event_bus.clone(),
        ));

        let workspace = workspace.unwrap_or_else(|| Arc::new(NullWorkspaceFacade));
        let checkpoint_engine = Arc::new(CheckpointEngine::new(
            checkpoints_repo.clone(),
            projects.clone(),
            tasks.clone(),
            assignments.clone(),
            memory_repo.clone(),
            workspace,
        ));

        let applier = applier.unwrap_or_else(|| Arc::new(FsFileChangeApplier));
        let agent_runtime = Arc::new(AgentRuntime::new(
            agents.clone(),
            substrate,
            context.clone(),
            blocker_queue.clone(),
            quality_gates.clone(),
            scheduler.clone(),
            applier,
            config.llm_model.clone(),
            config.llm_max_retries,
            Duration::from_millis(config.llm_initial_backoff_ms),
            Duration::from_millis(config.llm_max_backoff_ms),
        ));

        Self {
            pool,
            config,
            projects,
            agents,
            assignments,
            tasks,
            blockers_repo,
            events_repo,
            memory_repo,
            checkpoints_repo,
            reviews_repo,
            event_bus,
            context,
            blocker_queue,
            review_cache,
            quality_gates,
            scheduler,
            checkpoint_engine,
            agent_runtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::substrate::MockSubstrate;

    #[tokio::test]
    async fn open_in_memory_wires_every_service() {
        let substrate: Arc<dyn LlmSubstrate> = Arc::new(MockSubstrate::new(vec![]));
        let handle = CoreHandle::open_in_memory(Config::default(), substrate, None, None, None)
            .await
            .expect("in-memory handle should assemble");

        let project_id = handle.scheduler.create_project("p", "", "user-1").await.unwrap();
        let project = handle.projects.get(project_id).await.unwrap();
        assert_eq!(project.name, "p");
    }
}
