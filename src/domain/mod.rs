//! Domain layer: entities, ports, and the error taxonomy.
//!
//! Pure business logic, framework-agnostic. No I/O happens here; ports
//! describe the I/O this layer needs, adapters provide it.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{CoreError, CoreResult};
