//! Application services: the orchestration logic that sits between the
//! domain models/ports and the adapters that implement those ports.

pub mod agent_runtime;
pub mod blocker_queue;
pub mod checkpoint_engine;
pub mod context_manager;
pub mod core_handle;
pub mod event_bus;
pub mod gates;
pub mod quality_gate;
pub mod review_cache;
pub mod scheduler;

pub use agent_runtime::{AgentOutcome, AgentRuntime, FileChangeApplier, FsFileChangeApplier, NullFileChangeApplier};
pub use blocker_queue::{BlockerQueue, BlockerResolution};
pub use checkpoint_engine::{CheckpointEngine, NullWorkspaceFacade, WorkspaceFacade};
pub use context_manager::{ContextManager, FlashSaveOutcome};
pub use core_handle::CoreHandle;
pub use event_bus::{EventBus, Subscription};
pub use quality_gate::{BlockingFailure, GateReport, QualityGateReport, QualityGateRunner};
pub use review_cache::{NoOpReviewProducer, ReviewCache, ReviewProducer};
pub use scheduler::Scheduler;
