//! Change detection port - tracks which files a task's work has touched.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Detects file changes relative to a per-task baseline.
///
/// Implementations must degrade gracefully: when the underlying mechanism
/// is unavailable, `detect_changes` reports no changes rather than
/// propagating a failure into the control loop.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    /// Snapshot the current state as the baseline for `task_id`.
    async fn track_baseline(&self, task_id: Uuid) -> DomainResult<()>;

    /// Files changed since the baseline, for the given iteration.
    async fn detect_changes(&self, task_id: Uuid, iteration: u32) -> DomainResult<Vec<String>>;
}
