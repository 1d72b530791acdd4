//! CodeFRAME orchestration core: the domain model, services, and SQLite
//! persistence behind an autonomous multi-agent software-development
//! workflow.
//!
//! - [`domain`] -- entities, ports, and the error taxonomy. No I/O.
//! - [`adapters`] -- SQLite repositories and the LLM substrate port's test double.
//! - [`services`] -- application services: scheduler, context manager,
//!   blocker queue, quality-gate pipeline, checkpoint engine, and the
//!   per-agent runtime that drives them, all wired together by [`services::CoreHandle`].
//! - [`infrastructure`] -- configuration loading and structured logging.
//! - [`cli`] -- a thin `clap` front end over [`services::CoreHandle`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::error::{CoreError, CoreResult};
pub use services::CoreHandle;
