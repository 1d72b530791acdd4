//! Authoritative lifecycle logic (C8): project/agent/task lifecycle
//! transitions and the fair dispatch loop.
//!
//! A single `Scheduler` owns every lifecycle transition; `AgentRuntime`
//! workers call into it for assignment and finalization rather than
//! mutating entities directly, matching §5's "single authoritative
//! Scheduler" model.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{
    Agent, AgentStatus, Assignment, Blocker, BlockerKind, BlockerSeverity, EventType, Project, Task, TaskStatus,
};
use crate::domain::ports::{AgentRepository, AssignmentRepository, ProjectRepository, TaskRepository};
use crate::services::blocker_queue::BlockerQueue;
use crate::services::event_bus::EventBus;
use crate::services::quality_gate::QualityGateReport;

pub struct Scheduler {
    projects: Arc<dyn ProjectRepository>,
    agents: Arc<dyn AgentRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    tasks: Arc<dyn TaskRepository>,
    blockers: Arc<BlockerQueue>,
    events: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        agents: Arc<dyn AgentRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        tasks: Arc<dyn TaskRepository>,
        blockers: Arc<BlockerQueue>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { projects, agents, assignments, tasks, blockers, events }
    }

    async fn publish_best_effort(&self, project_id: Option<Uuid>, event_type: EventType, payload: serde_json::Value) {
        if let Err(e) = self.events.publish(project_id, event_type, payload).await {
            tracing::warn!(event = event_type.as_str(), error = %e, "best-effort event publish failed");
        }
    }

    pub async fn create_project(&self, name: impl Into<String>, description: impl Into<String>, user_id: impl Into<String>) -> CoreResult<Uuid> {
        let project = Project::new(name, user_id).with_description(description);
        self.projects.create(&project).await?;
        self.publish_best_effort(Some(project.id), EventType::ProjectCreated, serde_json::json!({ "name": project.name })).await;
        Ok(project.id)
    }

    pub async fn assign_agent(&self, project_id: Uuid, agent_id: Uuid, role: impl Into<String>) -> CoreResult<Assignment> {
        self.projects.get(project_id).await?;
        self.agents.get(agent_id).await?;
        let assignment = Assignment::new(project_id, agent_id, role);
        self.assignments.create(&assignment).await?;
        self.publish_best_effort(
            Some(project_id),
            EventType::AgentAssigned,
            serde_json::json!({ "agent_id": agent_id, "role": assignment.role }),
        )
        .await;
        Ok(assignment)
    }

    pub async fn unassign_agent(&self, project_id: Uuid, agent_id: Uuid) -> CoreResult<()> {
        let mut assignment = self
            .assignments
            .find_active(project_id, agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("assignment", agent_id))?;
        assignment.deactivate();
        self.assignments.update(&assignment).await?;
        self.publish_best_effort(Some(project_id), EventType::AgentUnassigned, serde_json::json!({ "agent_id": agent_id })).await;
        Ok(())
    }

    pub async fn update_role(&self, project_id: Uuid, agent_id: Uuid, role: impl Into<String>) -> CoreResult<Assignment> {
        let mut assignment = self
            .assignments
            .find_active(project_id, agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("assignment", agent_id))?;
        assignment.update_role(role);
        self.assignments.update(&assignment).await?;
        Ok(assignment)
    }

    pub async fn start(&self, project_id: Uuid) -> CoreResult<()> {
        let mut project = self.projects.get(project_id).await?;
        project.start().map_err(CoreError::validation)?;
        self.projects.update(&project).await?;
        self.publish_best_effort(Some(project_id), EventType::ProjectStatusChanged, serde_json::json!({ "status": "running" })).await;
        Ok(())
    }

    pub async fn pause(&self, project_id: Uuid) -> CoreResult<()> {
        let mut project = self.projects.get(project_id).await?;
        project.pause().map_err(CoreError::validation)?;
        self.projects.update(&project).await?;
        self.publish_best_effort(Some(project_id), EventType::ProjectStatusChanged, serde_json::json!({ "status": "paused" })).await;
        Ok(())
    }

    pub async fn resume(&self, project_id: Uuid) -> CoreResult<()> {
        let mut project = self.projects.get(project_id).await?;
        project.resume().map_err(CoreError::validation)?;
        self.projects.update(&project).await?;
        self.publish_best_effort(Some(project_id), EventType::ProjectStatusChanged, serde_json::json!({ "status": "running" })).await;
        Ok(())
    }

    /// Validates and assigns `task_id` to `agent_id`. Event emission is
    /// best-effort: a publish failure is logged, not returned to the caller.
    pub async fn assign_task(&self, task_id: Uuid, agent_id: Uuid) -> CoreResult<Task> {
        let mut task = self.tasks.get(task_id).await?;
        let agent = self.agents.get(agent_id).await?;

        if task.status.is_terminal() {
            return Err(CoreError::validation("cannot assign a terminal task"));
        }
        if agent.status == AgentStatus::Blocked {
            return Err(CoreError::validation("agent is blocked"));
        }
        self.assignments
            .find_active(task.project_id, agent_id)
            .await?
            .ok_or_else(|| CoreError::validation("agent has no active assignment on task's project"))?;

        task.assign_to(agent_id).map_err(CoreError::validation)?;
        self.tasks.update(&task).await?;
        self.publish_best_effort(
            Some(task.project_id),
            EventType::TaskAssigned,
            serde_json::json!({ "task_id": task.id, "agent_id": agent_id }),
        )
        .await;
        Ok(task)
    }

    /// Called by `AgentRuntime` once it has claimed a task and is about to
    /// invoke the LLM. Transitions `assigned -> in_progress`.
    pub async fn start_task_execution(&self, task_id: Uuid) -> CoreResult<Task> {
        let mut task = self.tasks.get(task_id).await?;
        task.transition_to(TaskStatus::InProgress).map_err(CoreError::validation)?;
        self.tasks.update(&task).await?;
        Ok(task)
    }

    /// Finds the next ready task for `agent_id` whose `agent_type` matches
    /// the agent's specialization, then atomically assigns it. No
    /// work-stealing across agent types.
    pub async fn next_task_for(&self, agent_id: Uuid, project_id: Uuid) -> CoreResult<Option<Task>> {
        let agent = self.agents.get(agent_id).await?;
        if !agent.is_available() {
            return Ok(None);
        }

        let candidates = self.tasks.get_ready_tasks(project_id, 50).await?;
        let Some(candidate) = candidates.into_iter().find(|t| t.agent_type == agent.agent_type.as_str()) else {
            return Ok(None);
        };

        match self.assign_task(candidate.id, agent_id).await {
            Ok(task) => Ok(Some(task)),
            Err(CoreError::ConcurrencyConflict { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// One dispatch tick: round-robin across running projects, assigning at
    /// most one ready task per idle agent. Intended to run on a
    /// `tokio::time::interval` inside a dedicated task.
    pub async fn dispatch_tick(&self) -> CoreResult<usize> {
        let projects = self.projects.list().await?;
        let mut dispatched = 0usize;

        for project in projects.into_iter().filter(|p| p.status == crate::domain::models::ProjectStatus::Running) {
            let assignments = self.assignments.list_by_project(project.id).await?;
            let mut agent_ids: Vec<Uuid> = assignments.iter().filter(|a| a.is_active).map(|a| a.agent_id).collect();
            agent_ids.sort();

            for agent_id in agent_ids {
                if self.next_task_for(agent_id, project.id).await?.is_some() {
                    dispatched += 1;
                }
            }
        }
        Ok(dispatched)
    }

    /// Called by `AgentRuntime` when the quality-gate pipeline has a
    /// verdict for a task. Marks the task completed on pass; on failure,
    /// self-corrects within budget or escalates to a SYNC blocker.
    pub async fn on_task_finalized(&self, task_id: Uuid, report: &QualityGateReport) -> CoreResult<()> {
        let mut task = self.tasks.get(task_id).await?;

        self.publish_best_effort(
            Some(task.project_id),
            EventType::QualityGateResult,
            serde_json::json!({ "task_id": task_id, "pass": report.pass, "blocking_failures": report.blocking_failures }),
        )
        .await;

        if report.pass {
            task.transition_to(TaskStatus::Completed).map_err(CoreError::validation)?;
            self.tasks.update(&task).await?;
            self.publish_best_effort(Some(task.project_id), EventType::TaskCompleted, serde_json::json!({ "task_id": task_id })).await;
            return Ok(());
        }

        task.transition_to(TaskStatus::Blocked).map_err(CoreError::validation)?;

        let has_critical = report.blocking_failures.iter().any(|f| f.severity == "critical");
        if !has_critical && task.can_self_correct() {
            task.record_self_correct_attempt();
            task.transition_to(TaskStatus::Assigned).map_err(CoreError::validation)?;
            self.tasks.update(&task).await?;
            return Ok(());
        }

        self.tasks.update(&task).await?;
        let reason = report
            .blocking_failures
            .iter()
            .map(|f| format!("{}: {}", f.gate, f.reason))
            .collect::<Vec<_>>()
            .join("; ");
        let blocker = Blocker::new(task.id, task.assigned_to.unwrap_or_default(), BlockerKind::Sync, BlockerSeverity::Critical, reason);
        self.blockers.raise(blocker).await?;
        self.publish_best_effort(Some(task.project_id), EventType::TaskBlocked, serde_json::json!({ "task_id": task_id })).await;
        Ok(())
    }

    /// Transitions a task to `blocked` and persists it. Called by
    /// `AgentRuntime` whenever it raises a SYNC blocker outside the
    /// quality-gate path (e.g. LLM retry exhaustion), so that every open
    /// SYNC blocker's task satisfies "task(b).status = blocked" (§3, §8)
    /// without `AgentRuntime` reaching into `Scheduler`'s private repositories.
    pub async fn escalate_to_blocker(&self, task_id: Uuid) -> CoreResult<Task> {
        let mut task = self.tasks.get(task_id).await?;
        if task.status != TaskStatus::Blocked {
            task.transition_to(TaskStatus::Blocked).map_err(CoreError::validation)?;
            self.tasks.update(&task).await?;
            self.publish_best_effort(Some(task.project_id), EventType::TaskBlocked, serde_json::json!({ "task_id": task_id })).await;
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteAgentRepository, SqliteAssignmentRepository, SqliteBlockerRepository,
        SqliteEventRepository, SqliteProjectRepository, SqliteTaskRepository,
    };
    use crate::domain::models::AgentType;
    use crate::domain::ports::TaskRepository as _;

    async fn scheduler() -> Scheduler {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        Scheduler::new(
            Arc::new(SqliteProjectRepository::new(pool.clone())),
            Arc::new(SqliteAgentRepository::new(pool.clone())),
            Arc::new(SqliteAssignmentRepository::new(pool.clone())),
            Arc::new(SqliteTaskRepository::new(pool.clone())),
            Arc::new(BlockerQueue::new(Arc::new(SqliteBlockerRepository::new(pool.clone())))),
            Arc::new(EventBus::new(Arc::new(SqliteEventRepository::new(pool)))),
        )
    }

    #[tokio::test]
    async fn next_task_for_respects_agent_type() {
        let scheduler = scheduler().await;
        let project_id = scheduler.create_project("p", "", "user-1").await.unwrap();
        scheduler.start(project_id).await.unwrap();

        let backend_agent = Agent::new(AgentType::Backend, "anthropic");
        scheduler.agents.create(&backend_agent).await.unwrap();
        scheduler.assign_agent(project_id, backend_agent.id, "implementer").await.unwrap();

        let frontend_task = Task::new(project_id, "build UI", "frontend");
        scheduler.tasks.create(&frontend_task).await.unwrap();
        let backend_task = Task::new(project_id, "build API", "backend");
        scheduler.tasks.create(&backend_task).await.unwrap();

        let assigned = scheduler.next_task_for(backend_agent.id, project_id).await.unwrap();
        assert_eq!(assigned.unwrap().id, backend_task.id);
    }

    #[tokio::test]
    async fn on_task_finalized_completes_passing_task() {
        let scheduler = scheduler().await;
        let project_id = scheduler.create_project("p", "", "user-1").await.unwrap();
        let mut task = Task::new(project_id, "t", "backend");
        task.transition_to(TaskStatus::Assigned).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.create(&task).await.unwrap();

        let report = QualityGateReport { pass: true, gate_reports: vec![], blocking_failures: vec![] };
        scheduler.on_task_finalized(task.id, &report).await.unwrap();

        let updated = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn on_task_finalized_self_corrects_non_critical_failure() {
        let scheduler = scheduler().await;
        let project_id = scheduler.create_project("p", "", "user-1").await.unwrap();
        let mut task = Task::new(project_id, "t", "backend");
        task.transition_to(TaskStatus::Assigned).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.create(&task).await.unwrap();

        let report = QualityGateReport {
            pass: false,
            gate_reports: vec![],
            blocking_failures: vec![crate::services::quality_gate::BlockingFailure {
                gate: "tests".to_string(),
                severity: "normal",
                reason: "1 test failed".to_string(),
                detail: serde_json::json!({}),
            }],
        };
        scheduler.on_task_finalized(task.id, &report).await.unwrap();

        let updated = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Assigned);
        assert_eq!(updated.self_correct_attempts, 1);
    }

    /// spec.md §8 Scenario 4: with the default budget of 3, a non-critical
    /// failure reopens the task on the 1st and 2nd failures; the 3rd failure
    /// escalates to a SYNC blocker instead of reopening a third time.
    #[tokio::test]
    async fn on_task_finalized_escalates_on_third_non_critical_failure() {
        let scheduler = scheduler().await;
        let project_id = scheduler.create_project("p", "", "user-1").await.unwrap();
        let agent = Agent::new(AgentType::Backend, "anthropic");
        scheduler.agents.create(&agent).await.unwrap();
        scheduler.assign_agent(project_id, agent.id, "implementer").await.unwrap();

        let mut task = Task::new(project_id, "t", "backend");
        task.assign_to(agent.id).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.create(&task).await.unwrap();

        let report = QualityGateReport {
            pass: false,
            gate_reports: vec![],
            blocking_failures: vec![crate::services::quality_gate::BlockingFailure {
                gate: "tests".to_string(),
                severity: "normal",
                reason: "1 test failed".to_string(),
                detail: serde_json::json!({}),
            }],
        };

        // 1st failure: reopens, attempt -> 1.
        scheduler.on_task_finalized(task.id, &report).await.unwrap();
        let after_first = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(after_first.status, TaskStatus::Assigned);
        assert_eq!(after_first.self_correct_attempts, 1);

        // Back to in_progress to simulate the agent re-running gates.
        let mut task = after_first;
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.update(&task).await.unwrap();

        // 2nd failure: reopens, attempt -> 2.
        scheduler.on_task_finalized(task.id, &report).await.unwrap();
        let after_second = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(after_second.status, TaskStatus::Assigned);
        assert_eq!(after_second.self_correct_attempts, 2);

        let mut task = after_second;
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.update(&task).await.unwrap();

        // 3rd failure: escalates to a SYNC blocker, task stays blocked.
        scheduler.on_task_finalized(task.id, &report).await.unwrap();
        let after_third = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(after_third.status, TaskStatus::Blocked);
        assert_eq!(after_third.self_correct_attempts, 2);
    }

    #[tokio::test]
    async fn on_task_finalized_escalates_critical_failure_to_blocker() {
        let scheduler = scheduler().await;
        let project_id = scheduler.create_project("p", "", "user-1").await.unwrap();
        let mut task = Task::new(project_id, "t", "backend");
        task.transition_to(TaskStatus::Assigned).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        scheduler.tasks.create(&task).await.unwrap();

        let report = QualityGateReport {
            pass: false,
            gate_reports: vec![],
            blocking_failures: vec![crate::services::quality_gate::BlockingFailure {
                gate: "type_check".to_string(),
                severity: "critical",
                reason: "infra failure".to_string(),
                detail: serde_json::json!({}),
            }],
        };
        scheduler.on_task_finalized(task.id, &report).await.unwrap();

        let updated = scheduler.tasks.get(task.id).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Blocked);
        let blockers = scheduler.blockers.list_for_task(task.id).await.unwrap();
        assert_eq!(blockers.len(), 1);
    }
}
