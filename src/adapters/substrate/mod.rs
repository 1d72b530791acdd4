//! LLM substrate adapters.

pub mod mock;

pub use mock::MockSubstrate;
