//! Dispatches a parsed [`super::Commands`] against a [`CoreHandle`], printing
//! either a formatted table or (with `--json`) the raw serialized result.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use comfy_table::Table;
use uuid::Uuid;

use crate::cli::{
    AgentCommands, BlockerCommands, CheckpointCommands, Commands, ContextCommands, EventCommands, GateCommands,
    PriorityArg, ProjectCommands, ReviewCommands, TaskCommands,
};
use crate::domain::models::{Agent, AgentType, Task, TaskPriority, TaskStatus};
use crate::domain::ports::{AgentRepository, ProjectRepository, TaskRepository};
use crate::services::CoreHandle;

fn print_json(value: impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

impl From<PriorityArg> for TaskPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
            PriorityArg::Critical => Self::Critical,
        }
    }
}

pub async fn dispatch(handle: &CoreHandle, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Project(cmd) => project(handle, cmd, json).await,
        Commands::Agent(cmd) => agent(handle, cmd, json).await,
        Commands::Task(cmd) => task(handle, cmd, json).await,
        Commands::Checkpoint(cmd) => checkpoint(handle, cmd, json).await,
        Commands::Blocker(cmd) => blocker(handle, cmd, json).await,
        Commands::Review(cmd) => review(handle, cmd, json).await,
        Commands::Context(cmd) => context(handle, cmd, json).await,
        Commands::Gate(cmd) => gate(handle, cmd, json).await,
        Commands::Event(cmd) => event(handle, cmd, json).await,
    }
}

async fn project(handle: &CoreHandle, cmd: ProjectCommands, json: bool) -> Result<()> {
    match cmd {
        ProjectCommands::Create { name, description, user } => {
            let id = handle.scheduler.create_project(name, description, user).await?;
            if json {
                print_json(serde_json::json!({ "project_id": id }))?;
            } else {
                println!("created project {id}");
            }
        }
        ProjectCommands::List { user } => {
            let projects = match user {
                Some(user) => handle.projects.list_by_user(&user).await?,
                None => handle.projects.list().await?,
            };
            if json {
                print_json(projects)?;
            } else {
                let mut table = Table::new();
                table.set_header(vec!["id", "name", "status", "phase"]);
                for p in projects {
                    table.add_row(vec![p.id.to_string(), p.name, p.status.as_str().to_string(), p.phase.as_str().to_string()]);
                }
                println!("{table}");
            }
        }
        ProjectCommands::Start { project_id } => {
            handle.scheduler.start(project_id).await?;
            println!("started {project_id}");
        }
        ProjectCommands::Pause { project_id } => {
            handle.scheduler.pause(project_id).await?;
            println!("paused {project_id}");
        }
        ProjectCommands::Resume { project_id } => {
            handle.scheduler.resume(project_id).await?;
            println!("resumed {project_id}");
        }
    }
    Ok(())
}

async fn agent(handle: &CoreHandle, cmd: AgentCommands, json: bool) -> Result<()> {
    match cmd {
        AgentCommands::Register { agent_type, provider } => {
            let agent_type = AgentType::parse_str(&agent_type).ok_or_else(|| anyhow!("unknown agent type: {agent_type}"))?;
            let registered = Agent::new(agent_type, provider);
            let id = registered.id;
            handle.agents.create(&registered).await?;
            if json {
                print_json(serde_json::json!({ "agent_id": id }))?;
            } else {
                println!("registered agent {id}");
            }
        }
        AgentCommands::List => {
            let agents = handle.agents.list().await?;
            if json {
                print_json(agents)?;
            } else {
                let mut table = Table::new();
                table.set_header(vec!["id", "type", "status", "maturity"]);
                for a in agents {
                    table.add_row(vec![a.id.to_string(), a.agent_type.as_str().to_string(), a.status.as_str().to_string(), a.maturity.as_str().to_string()]);
                }
                println!("{table}");
            }
        }
        AgentCommands::Assign { project_id, agent_id, role } => {
            let assignment = handle.scheduler.assign_agent(project_id, agent_id, role).await?;
            if json {
                print_json(assignment)?;
            } else {
                println!("assigned agent {agent_id} to project {project_id}");
            }
        }
    }
    Ok(())
}

async fn task(handle: &CoreHandle, cmd: TaskCommands, json: bool) -> Result<()> {
    match cmd {
        TaskCommands::Submit { project_id, title, agent_type, description, priority } => {
            let new_task = Task::new(project_id, title, agent_type)
                .with_description(description)
                .with_priority(priority.into());
            handle.tasks.create(&new_task).await?;
            if json {
                print_json(serde_json::json!({ "task_id": new_task.id }))?;
            } else {
                println!("submitted task {}", new_task.id);
            }
        }
        TaskCommands::List { project_id, status } => {
            let tasks = match status {
                Some(status) => {
                    let status = TaskStatus::parse_str(&status).ok_or_else(|| anyhow!("unknown task status: {status}"))?;
                    handle.tasks.list_by_status(project_id, status).await?
                }
                None => handle.tasks.list_by_project(project_id).await?,
            };
            if json {
                print_json(tasks)?;
            } else {
                let mut table = Table::new();
                table.set_header(vec!["id", "title", "status", "priority", "agent_type"]);
                for t in tasks {
                    table.add_row(vec![t.id.to_string(), t.title, t.status.as_str().to_string(), t.priority.as_str().to_string(), t.agent_type]);
                }
                println!("{table}");
            }
        }
        TaskCommands::Show { task_id } => {
            let found = handle.tasks.get(task_id).await?;
            print_json(found)?;
        }
    }
    Ok(())
}

async fn checkpoint(handle: &CoreHandle, cmd: CheckpointCommands, json: bool) -> Result<()> {
    match cmd {
        CheckpointCommands::Create { project_id, name, description } => {
            let created = handle.checkpoint_engine.create(project_id, name, description).await?;
            if json {
                print_json(serde_json::json!({ "checkpoint_id": created.id }))?;
            } else {
                println!("created checkpoint {}", created.id);
            }
        }
        CheckpointCommands::Restore { checkpoint_id } => {
            handle.checkpoint_engine.restore(checkpoint_id).await?;
            println!("restored checkpoint {checkpoint_id}");
        }
        CheckpointCommands::Diff { checkpoint_id } => {
            let diff = handle.checkpoint_engine.diff(checkpoint_id).await?;
            print_json(serde_json::json!({
                "tasks_added": diff.tasks.added.len(),
                "tasks_removed": diff.tasks.removed.len(),
                "tasks_changed": diff.tasks.changed.len(),
                "assignments_added": diff.assignments.added.len(),
                "assignments_removed": diff.assignments.removed.len(),
                "memory_items_added": diff.memory_items.added.len(),
            }))?;
        }
    }
    Ok(())
}

async fn blocker(handle: &CoreHandle, cmd: BlockerCommands, json: bool) -> Result<()> {
    match cmd {
        BlockerCommands::List { task_id } => {
            let blockers = handle.blocker_queue.list_for_task(task_id).await?;
            if json {
                print_json(blockers)?;
            } else {
                let mut table = Table::new();
                table.set_header(vec!["id", "kind", "severity", "status", "question"]);
                for b in blockers {
                    table.add_row(vec![b.id.to_string(), b.kind.as_str().to_string(), b.severity.as_str().to_string(), b.status.as_str().to_string(), b.prompt]);
                }
                println!("{table}");
            }
        }
        BlockerCommands::Resolve { blocker_id, answer } => {
            let resolved = handle.blocker_queue.resolve(blocker_id, answer).await?;
            println!("resolved blocker {} ({})", resolved.id, resolved.status.as_str());
        }
    }
    Ok(())
}

async fn review(handle: &CoreHandle, cmd: ReviewCommands, _json: bool) -> Result<()> {
    let ReviewCommands::Show { task_id, fingerprint, workspace_root } = cmd;
    let report = handle.review_cache.review(task_id, &fingerprint, &workspace_root).await?;
    print_json(report)
}

async fn context(handle: &CoreHandle, cmd: ContextCommands, json: bool) -> Result<()> {
    let ContextCommands::Show { agent_id, query } = cmd;
    let items = handle.context.retrieve(agent_id, query.as_deref()).await?;
    if json {
        print_json(items)
    } else {
        let mut table = Table::new();
        table.set_header(vec!["key", "tier", "importance", "tokens"]);
        for item in items {
            table.add_row(vec![item.key, item.tier.as_str().to_string(), format!("{:.2}", item.importance), item.token_count.to_string()]);
        }
        println!("{table}");
        Ok(())
    }
}

async fn gate(handle: &CoreHandle, cmd: GateCommands, json: bool) -> Result<()> {
    let GateCommands::Run { task_id, fingerprint, workspace_root } = cmd;
    let report = handle.quality_gates.run(task_id, &fingerprint, &workspace_root).await?;
    if json {
        print_json(report)
    } else {
        println!("pass: {}", report.pass);
        for gate_report in &report.gate_reports {
            println!("  {}: {} -- {}", gate_report.gate, gate_report.outcome.pass, gate_report.outcome.summary);
        }
        Ok(())
    }
}

async fn event(handle: &CoreHandle, cmd: EventCommands, json: bool) -> Result<()> {
    let EventCommands::Tail { project_id } = cmd;
    let filter: HashSet<Uuid> = project_id.into_iter().collect();
    let mut subscription = handle.event_bus.subscribe(filter).await;
    println!("tailing events (ctrl-c to stop)...");
    while let Some(event) = subscription.receiver.recv().await {
        if json {
            print_json(&event)?;
        } else {
            println!("[{}] {} {}", event.seq, event.event_type.as_str(), event.payload);
        }
    }
    Ok(())
}

/// Builds a [`CoreHandle`] wired with the bundled mock LLM substrate and
/// no-op review/workspace doubles. Intended for `codeframe` invocations that
/// don't need a real LLM call (project/task/agent bookkeeping); driving an
/// actual agent loop requires a caller-supplied substrate via the library API.
pub async fn open_default_handle(config: crate::domain::models::Config) -> Result<CoreHandle> {
    use crate::adapters::substrate::MockSubstrate;
    let substrate: Arc<dyn crate::domain::ports::LlmSubstrate> = Arc::new(MockSubstrate::new(vec![]));
    Ok(CoreHandle::open(config, substrate, None, None, None).await?)
}
