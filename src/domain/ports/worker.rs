//! Worker port - interface to the external collaborator that performs
//! task work.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// One request to the worker: the task, the iteration number, and the
/// accumulated context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInvocation {
    pub task_id: Uuid,
    pub description: String,
    /// 1-based iteration number within the current execution.
    pub iteration: u32,
    pub context: HashMap<String, Value>,
}

/// Status the worker claims for its own attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Succeeded,
    Failed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// What came back from one worker invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReply {
    pub status: WorkerStatus,
    /// Raw textual output, scanned for completion indicators.
    pub output: String,
    /// Structured payload, passed through opaquely.
    pub result: Value,
    /// Error message, when the worker reports one.
    pub error: Option<String>,
}

impl WorkerReply {
    /// A plain successful reply carrying only output text.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Succeeded,
            output: output.into(),
            result: Value::Null,
            error: None,
        }
    }

    /// A failed reply with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failed,
            output: String::new(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Capability interface for worker implementations.
///
/// The executor does not care how a worker produces output; personas,
/// prompt assembly, and transport all live behind this trait. An `Err`
/// or a timeout is treated as an invocation failure, recorded, and the
/// loop continues.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Short implementation name for logs.
    fn name(&self) -> &'static str;

    /// Perform one unit of work for the task.
    async fn invoke(&self, request: WorkerInvocation) -> DomainResult<WorkerReply>;
}
