//! Domain errors for the pitboss control loop.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while supervising a task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Session not found for task: {0}")]
    SessionNotFound(Uuid),

    #[error("Worker invocation failed for task {task_id}: {reason}")]
    WorkerFailed { task_id: Uuid, reason: String },

    #[error("Worker invocation for task {task_id} timed out after {timeout_secs}s")]
    WorkerTimeout { task_id: Uuid, timeout_secs: u64 },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Circuit open for task {task_id}: {reason}")]
    CircuitOpen { task_id: Uuid, reason: String },

    #[error("Iteration budget exhausted after {0} iterations")]
    IterationBudgetExhausted(u32),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}
