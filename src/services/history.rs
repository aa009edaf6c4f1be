//! In-memory decision history.
//!
//! Ring of recent decision outcomes used by the confidence calculator.
//! Similarity is a cheap prefix match on the task title; anything fancier
//! belongs behind its own port.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::{ActionTaken, AutonomyLevel};

/// How many title characters participate in the similarity prefix.
const SIMILARITY_PREFIX_CHARS: usize = 20;

/// One completed decision with its observed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub task_title: String,
    pub level: AutonomyLevel,
    pub confidence: f64,
    pub risk: f64,
    pub action_taken: ActionTaken,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded store of past decisions, oldest evicted first.
#[derive(Debug)]
pub struct DecisionHistory {
    entries: RwLock<VecDeque<DecisionRecord>>,
    capacity: usize,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest entry once at capacity.
    pub async fn record(&self, record: DecisionRecord) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        debug!(
            task_title = %record.task_title,
            success = record.success,
            "recorded decision outcome"
        );
        entries.push_back(record);
    }

    /// Records whose title shares a case-insensitive prefix with `title`.
    pub async fn find_similar(&self, title: &str) -> Vec<DecisionRecord> {
        let needle = similarity_key(title);
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|r| similarity_key(&r.task_title) == needle)
            .cloned()
            .collect()
    }

    /// Fraction of successful outcomes across the whole history.
    pub async fn success_rate(&self) -> Option<f64> {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return None;
        }
        let successes = entries.iter().filter(|r| r.success).count();
        Some(successes as f64 / entries.len() as f64)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn similarity_key(title: &str) -> String {
    title
        .chars()
        .take(SIMILARITY_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase()
}
