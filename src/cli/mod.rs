//! Thin `clap` front end over [`crate::services::CoreHandle`].
//!
//! One subcommand group per `§6` operation group (`project`, `agent`,
//! `task`, `checkpoint`, `blocker`, `review`, `context`, `gate`, `event`).
//! This is a local, scriptable surface, not the HTTP/WebSocket transport --
//! a future transport adapter would sit on the same `CoreHandle`.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "codeframe", about = "CodeFRAME orchestration core", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of a formatted table.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Project lifecycle: create, list, start, pause, resume.
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Agent registration and listing.
    #[command(subcommand)]
    Agent(AgentCommands),
    /// Task submission, listing, and inspection.
    #[command(subcommand)]
    Task(TaskCommands),
    /// Snapshot/restore/diff of project state.
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),
    /// List and resolve open blockers.
    #[command(subcommand)]
    Blocker(BlockerCommands),
    /// Fetch a task's cached or freshly produced review.
    #[command(subcommand)]
    Review(ReviewCommands),
    /// Inspect an agent's tiered memory.
    #[command(subcommand)]
    Context(ContextCommands),
    /// Run the quality-gate pipeline against a workspace.
    #[command(subcommand)]
    Gate(GateCommands),
    /// Tail the project event stream.
    #[command(subcommand)]
    Event(EventCommands),
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommands {
    Create { name: String, #[arg(long, default_value = "")] description: String, #[arg(long, default_value = "local")] user: String },
    List { #[arg(long)] user: Option<String> },
    Start { project_id: uuid::Uuid },
    Pause { project_id: uuid::Uuid },
    Resume { project_id: uuid::Uuid },
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    Register { agent_type: String, #[arg(long, default_value = "codeframe")] provider: String },
    List,
    Assign { project_id: uuid::Uuid, agent_id: uuid::Uuid, #[arg(long, default_value = "contributor")] role: String },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    Submit {
        project_id: uuid::Uuid,
        title: String,
        agent_type: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
    },
    List { project_id: uuid::Uuid, #[arg(long)] status: Option<String> },
    Show { task_id: uuid::Uuid },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Subcommand)]
pub enum CheckpointCommands {
    Create { project_id: uuid::Uuid, name: String, #[arg(long, default_value = "")] description: String },
    Restore { checkpoint_id: uuid::Uuid },
    Diff { checkpoint_id: uuid::Uuid },
}

#[derive(Debug, Subcommand)]
pub enum BlockerCommands {
    List { task_id: uuid::Uuid },
    Resolve { blocker_id: uuid::Uuid, answer: String },
}

#[derive(Debug, Subcommand)]
pub enum ReviewCommands {
    Show { task_id: uuid::Uuid, fingerprint: String, workspace_root: std::path::PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum ContextCommands {
    Show { agent_id: uuid::Uuid, #[arg(long)] query: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum GateCommands {
    Run { task_id: uuid::Uuid, fingerprint: String, workspace_root: std::path::PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum EventCommands {
    Tail { #[arg(long)] project_id: Option<uuid::Uuid> },
}
