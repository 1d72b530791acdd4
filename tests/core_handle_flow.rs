//! End-to-end flows over a fully wired [`CoreHandle`]: the bookkeeping
//! operations (project/agent/task lifecycle, checkpoint restore, blocker
//! resolution) that don't require a real quality-gate subprocess.

use std::sync::Arc;

use codeframe_core::adapters::substrate::MockSubstrate;
use codeframe_core::domain::models::{AgentType, BlockerKind, BlockerSeverity, Config, TaskStatus};
use codeframe_core::domain::models::{Agent, Blocker, Task};
use codeframe_core::domain::ports::{AgentRepository, LlmSubstrate, ProjectRepository, TaskRepository};
use codeframe_core::services::CoreHandle;

async fn handle() -> CoreHandle {
    let substrate: Arc<dyn LlmSubstrate> = Arc::new(MockSubstrate::default());
    CoreHandle::open_in_memory(Config::default(), substrate, None, None, None)
        .await
        .expect("in-memory handle should assemble")
}

#[tokio::test]
async fn project_agent_task_lifecycle_reaches_assigned() {
    let handle = handle().await;

    let project_id = handle.scheduler.create_project("demo", "a test project", "user-1").await.unwrap();
    let project = handle.projects.get(project_id).await.unwrap();
    assert_eq!(project.name, "demo");

    let agent = Agent::new(AgentType::Backend, "codeframe");
    let agent_id = agent.id;
    handle.agents.create(&agent).await.unwrap();

    handle.scheduler.assign_agent(project_id, agent_id, "contributor").await.unwrap();

    let task = Task::new(project_id, "wire up the login form", "backend");
    let task_id = task.id;
    handle.tasks.create(&task).await.unwrap();

    let claimed = handle.scheduler.next_task_for(agent_id, project_id).await.unwrap();
    assert_eq!(claimed.map(|t| t.id), Some(task_id));

    let reloaded = handle.tasks.get(task_id).await.unwrap();
    assert_eq!(reloaded.status, TaskStatus::Assigned);
    assert_eq!(reloaded.assigned_to, Some(agent_id));
}

#[tokio::test]
async fn next_task_for_skips_agent_type_mismatch() {
    let handle = handle().await;
    let project_id = handle.scheduler.create_project("demo", "", "user-1").await.unwrap();

    let frontend_agent = Agent::new(AgentType::Frontend, "codeframe");
    handle.agents.create(&frontend_agent).await.unwrap();
    handle.scheduler.assign_agent(project_id, frontend_agent.id, "contributor").await.unwrap();

    let backend_task = Task::new(project_id, "migrate the schema", "backend");
    handle.tasks.create(&backend_task).await.unwrap();

    let claimed = handle.scheduler.next_task_for(frontend_agent.id, project_id).await.unwrap();
    assert!(claimed.is_none(), "a frontend agent should never claim a backend task");
}

#[tokio::test]
async fn checkpoint_restore_reverts_a_task_to_its_snapshot_state() {
    let handle = handle().await;
    let project_id = handle.scheduler.create_project("demo", "", "user-1").await.unwrap();

    let mut task = Task::new(project_id, "ship the release", "backend");
    task.transition_to(TaskStatus::Assigned).unwrap();
    handle.tasks.create(&task).await.unwrap();

    let checkpoint = handle.checkpoint_engine.create(project_id, "pre-risky-change", "").await.unwrap();

    task.transition_to(TaskStatus::InProgress).unwrap();
    task.transition_to(TaskStatus::Failed).unwrap();
    handle.tasks.update(&task).await.unwrap();

    handle.checkpoint_engine.restore(checkpoint.id).await.unwrap();

    let restored = handle.tasks.get(task.id).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Assigned);
}

#[tokio::test]
async fn sync_blocker_resolution_wakes_the_waiting_agent() {
    let handle = handle().await;
    let project_id = handle.scheduler.create_project("demo", "", "user-1").await.unwrap();
    let task = Task::new(project_id, "pick an auth strategy", "backend");
    handle.tasks.create(&task).await.unwrap();

    let blocker = Blocker::new(task.id, uuid::Uuid::new_v4(), BlockerKind::Sync, BlockerSeverity::High, "OAuth or API keys?");
    let blocker = handle.blocker_queue.raise(blocker).await.unwrap();

    let queue = handle.blocker_queue.clone();
    let blocker_id = blocker.id;
    let waiting = tokio::spawn(async move { queue.wait(blocker_id).await });

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    handle.blocker_queue.resolve(blocker.id, "API keys").await.unwrap();

    let resolution = waiting.await.unwrap().unwrap();
    assert_eq!(
        resolution,
        codeframe_core::services::BlockerResolution::Answered("API keys".to_string())
    );
}
