//! Persisted cross-iteration session state for one task.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::iteration::IterationRecord;

/// Condensed view of one iteration, kept in the session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationSummary {
    /// 1-based iteration number.
    pub iteration: u32,
    /// When the iteration was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Leading excerpt of the worker output.
    pub excerpt: String,
    /// How many files had changed since the baseline.
    pub files_changed: usize,
    /// How many errors the iteration recorded.
    pub error_count: usize,
    /// Whether the progress tracker saw progress.
    pub made_progress: bool,
}

const EXCERPT_LEN: usize = 200;

impl IterationSummary {
    pub fn from_record(record: &IterationRecord) -> Self {
        Self {
            iteration: record.iteration,
            recorded_at: record.recorded_at,
            excerpt: excerpt(&record.worker_output),
            files_changed: record.changed_files.len(),
            error_count: record.errors.len(),
            made_progress: record.has_progress,
        }
    }
}

/// Take the first ~200 chars on a char boundary.
fn excerpt(output: &str) -> String {
    if output.chars().count() <= EXCERPT_LEN {
        output.to_string()
    } else {
        output.chars().take(EXCERPT_LEN).collect()
    }
}

/// Cross-iteration context for one task's execution.
///
/// One session exists per task identifier. A session is recreated, never
/// merged, when the assigned worker role changes or the session expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    /// Task this session belongs to.
    pub task_id: Uuid,
    /// Worker role the session was created for.
    pub worker_role: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time the session was read or written.
    pub last_accessed: DateTime<Utc>,
    /// Ordered iteration summaries, oldest first.
    pub iterations: Vec<IterationSummary>,
    /// Free-form context, merged on store.
    pub context: HashMap<String, Value>,
}

impl TaskSession {
    pub fn new(task_id: Uuid, worker_role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            worker_role: worker_role.into(),
            created_at: now,
            last_accessed: now,
            iterations: Vec::new(),
            context: HashMap::new(),
        }
    }

    /// Refresh the last-accessed timestamp.
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Whether the session has outlived the expiration window.
    pub fn is_expired(&self, expiration: Duration) -> bool {
        self.last_accessed + expiration < Utc::now()
    }

    /// Append a summary, discarding the oldest beyond `max_summaries`.
    pub fn push_summary(&mut self, summary: IterationSummary, max_summaries: usize) {
        self.iterations.push(summary);
        if self.iterations.len() > max_summaries {
            let excess = self.iterations.len() - max_summaries;
            self.iterations.drain(..excess);
        }
        self.touch();
    }

    /// Merge entries into the context map; existing keys are overwritten,
    /// unrelated keys are kept.
    pub fn merge_context(&mut self, entries: HashMap<String, Value>) {
        self.context.extend(entries);
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_cap() {
        let mut session = TaskSession::new(Uuid::new_v4(), "engineer");
        for i in 1..=60 {
            let record = IterationRecord::new(i, vec![], None, "output", vec![]);
            session.push_summary(IterationSummary::from_record(&record), 50);
        }
        assert_eq!(session.iterations.len(), 50);
        // Oldest entries were discarded.
        assert_eq!(session.iterations[0].iteration, 11);
        assert_eq!(session.iterations[49].iteration, 60);
    }

    #[test]
    fn test_context_merges_not_replaces() {
        let mut session = TaskSession::new(Uuid::new_v4(), "engineer");
        session.merge_context([("a".to_string(), json!(1))].into_iter().collect());
        session.merge_context([("b".to_string(), json!(2))].into_iter().collect());
        assert_eq!(session.context.len(), 2);

        session.merge_context([("a".to_string(), json!(9))].into_iter().collect());
        assert_eq!(session.context["a"], json!(9));
        assert_eq!(session.context["b"], json!(2));
    }

    #[test]
    fn test_expiry() {
        let mut session = TaskSession::new(Uuid::new_v4(), "engineer");
        assert!(!session.is_expired(Duration::hours(24)));
        session.last_accessed = Utc::now() - Duration::hours(25);
        assert!(session.is_expired(Duration::hours(24)));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "ü".repeat(300);
        let record = IterationRecord::new(1, vec![], None, long, vec![]);
        let summary = IterationSummary::from_record(&record);
        assert_eq!(summary.excerpt.chars().count(), 200);
    }
}
