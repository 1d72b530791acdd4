//! Core error taxonomy.
//!
//! One variant family per failure kind the orchestration core distinguishes;
//! callers branch on kind, never on message text.

use uuid::Uuid;

/// Crate-wide result alias for domain and service code.
pub type CoreResult<T> = Result<T, CoreError>;

/// The orchestration core's error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller supplied invalid IDs, an invalid state transition, or violated an invariant.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A row the caller expected to exist does not.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// Transactional persistence failure. The whole transaction rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Two racing mutations on the same entity; one loser, both surfaced.
    #[error("concurrency conflict on {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: Uuid },

    /// A quality gate's subprocess itself failed, independent of the check it runs.
    #[error("gate infrastructure error ({gate}): {reason}")]
    GateInfrastructure { gate: String, reason: String },

    /// `ContextManager` produced a tier assignment that violates the HOT budget. Implementation bug.
    #[error("context budget violation for agent {agent_id}: {hot_tokens} hot tokens > budget {budget}")]
    ContextBudgetViolation {
        agent_id: Uuid,
        hot_tokens: u64,
        budget: u64,
    },

    /// `LLMClient` failure. `transient` ones are retried with backoff by the caller.
    #[error("llm error: {message}")]
    Llm { transient: bool, message: String },

    /// Configuration was missing or malformed.
    #[error("config error: {0}")]
    Config(String),

    /// A wrapped failure with no more specific kind (I/O, serialization, etc.).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn concurrency_conflict(entity: &'static str, id: Uuid) -> Self {
        Self::ConcurrencyConflict { entity, id }
    }

    pub fn gate_infrastructure(gate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GateInfrastructure {
            gate: gate.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller should retry this operation without operator intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Llm { transient, .. } => *transient,
            Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Whether this failure requires a human-in-the-loop blocker rather than a retry.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_transient_is_transient() {
        let e = CoreError::Llm { transient: true, message: "timeout".into() };
        assert!(e.is_transient());
        assert!(!e.is_permanent());
    }

    #[test]
    fn llm_permanent_is_permanent() {
        let e = CoreError::Llm { transient: false, message: "bad auth".into() };
        assert!(e.is_permanent());
    }

    #[test]
    fn validation_is_permanent() {
        let e = CoreError::validation("bad id");
        assert!(e.is_permanent());
    }

    #[test]
    fn storage_is_transient() {
        let e = CoreError::Storage(sqlx::Error::RowNotFound);
        assert!(e.is_transient());
    }
}
