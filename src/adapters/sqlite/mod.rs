//! SQLite adapter implementing the domain ports.

pub mod agent_repository;
pub mod assignment_repository;
pub mod blocker_repository;
pub mod checkpoint_repository;
pub mod connection;
pub mod event_repository;
pub mod memory_repository;
pub mod migrations;
pub mod project_repository;
pub mod review_repository;
pub mod task_repository;

pub use agent_repository::SqliteAgentRepository;
pub use assignment_repository::SqliteAssignmentRepository;
pub use blocker_repository::SqliteBlockerRepository;
pub use checkpoint_repository::SqliteCheckpointRepository;
pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use event_repository::SqliteEventRepository;
pub use memory_repository::SqliteMemoryRepository;
pub use migrations::Migrator;
pub use project_repository::SqliteProjectRepository;
pub use review_repository::SqliteReviewRepository;
pub use task_repository::SqliteTaskRepository;
