//! Infrastructure layer: ambient concerns that sit outside the domain --
//! configuration loading and structured logging. The database adapter
//! lives under [`crate::adapters::sqlite`], alongside the domain ports it
//! implements.

pub mod config;
pub mod logging;
