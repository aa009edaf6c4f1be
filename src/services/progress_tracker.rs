//! Progress tracking across task iterations.
//!
//! Decides whether each iteration made progress relative to the one before
//! it, keeps a bounded in-memory history per task, and mirrors that history
//! to disk after every record. Persistence is best-effort: a failed write is
//! logged and the in-memory state stays authoritative.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{IterationRecord, ProgressConfig};
use crate::domain::DomainResult;

/// Number of trailing records examined by the stuck heuristic.
const STUCK_WINDOW: usize = 3;

/// On-disk shape of one task's progress history.
#[derive(Debug, Serialize, Deserialize)]
struct ProgressDocument {
    iterations: Vec<IterationRecord>,
}

/// Keyed progress store, one bounded history per task.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    config: ProgressConfig,
    state_dir: PathBuf,
    records: Arc<RwLock<HashMap<Uuid, Vec<IterationRecord>>>>,
}

impl ProgressTracker {
    pub fn new(config: ProgressConfig, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            state_dir: state_dir.into(),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Finalize and store a draft record. Sets `has_progress` by comparing
    /// against the previous record, appends, and mirrors to disk.
    #[instrument(skip(self, draft), fields(task_id = %task_id, iteration = draft.iteration))]
    pub async fn record_iteration(
        &self,
        task_id: Uuid,
        mut draft: IterationRecord,
    ) -> IterationRecord {
        let mut records = self.records.write().await;
        let history = records.entry(task_id).or_default();

        draft.has_progress = has_progress(&draft, history.last());
        debug!(
            has_progress = draft.has_progress,
            changed = draft.changed_files.len(),
            errors = draft.errors.len(),
            "recorded iteration"
        );

        history.push(draft.clone());
        if history.len() > self.config.max_records {
            let excess = history.len() - self.config.max_records;
            history.drain(..excess);
        }

        let snapshot = ProgressDocument {
            iterations: history.clone(),
        };
        drop(records);

        if let Err(error) = self.persist(task_id, &snapshot).await {
            warn!(%task_id, %error, "failed to persist progress history");
        }
        draft
    }

    /// Stuck means three straight iterations without progress that all share
    /// at least one error.
    pub async fn is_stuck(&self, task_id: Uuid) -> bool {
        let records = self.records.read().await;
        let Some(history) = records.get(&task_id) else {
            return false;
        };
        if history.len() < STUCK_WINDOW {
            return false;
        }
        let tail = &history[history.len() - STUCK_WINDOW..];
        if tail.iter().any(|r| r.has_progress) {
            return false;
        }
        let mut shared = tail[0].error_set();
        for record in &tail[1..] {
            let set = record.error_set();
            shared.retain(|e| set.contains(e));
        }
        !shared.is_empty()
    }

    /// Full recorded history for a task, oldest first.
    pub async fn history(&self, task_id: Uuid) -> Vec<IterationRecord> {
        self.records
            .read()
            .await
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The most recent record for a task, if any.
    pub async fn latest(&self, task_id: Uuid) -> Option<IterationRecord> {
        self.records
            .read()
            .await
            .get(&task_id)
            .and_then(|h| h.last().cloned())
    }

    /// Restore a task's history from disk, replacing any in-memory state.
    /// Returns the number of records restored.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn load(&self, task_id: Uuid) -> DomainResult<usize> {
        let path = self.progress_path(task_id);
        let raw = tokio::fs::read_to_string(&path).await?;
        let doc: ProgressDocument = serde_json::from_str(&raw)?;
        let count = doc.iterations.len();
        self.records.write().await.insert(task_id, doc.iterations);
        debug!(count, "restored progress history from disk");
        Ok(count)
    }

    /// Drop a task's history from memory and disk.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn clear(&self, task_id: Uuid) {
        self.records.write().await.remove(&task_id);
        let path = self.progress_path(task_id);
        if let Err(error) = tokio::fs::remove_file(&path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(%task_id, %error, "failed to remove progress file");
            }
        }
    }

    fn progress_path(&self, task_id: Uuid) -> PathBuf {
        self.state_dir
            .join("tasks")
            .join("progress")
            .join(format!("{task_id}.json"))
    }

    async fn persist(&self, task_id: Uuid, doc: &ProgressDocument) -> DomainResult<()> {
        let path = self.progress_path(task_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }
}

/// Progress relative to the previous iteration: new file changes, a
/// validation gate recovering, or a strictly shrinking error list.
fn has_progress(current: &IterationRecord, previous: Option<&IterationRecord>) -> bool {
    if !current.changed_files.is_empty() {
        return true;
    }
    let Some(previous) = previous else {
        return false;
    };
    let validation_recovered = current.validation.as_ref().is_some_and(|v| v.passed())
        && previous.validation.as_ref().is_some_and(|v| !v.passed());
    if validation_recovered {
        return true;
    }
    current.errors.len() < previous.errors.len()
}
