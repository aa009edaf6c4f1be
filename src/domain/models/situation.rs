//! Situation snapshot and derived analysis.
//!
//! A `Situation` is the immutable input to an autonomy decision: the task
//! plus whatever the caller knows about the environment at that moment.
//! `SituationAnalysis` is derived fresh for every decision and never
//! persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::task::Task;

/// Complexity classification derived from task shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// Description-length and dependency-count cutoffs for the complexity classes.
const HIGH_DESCRIPTION_LEN: usize = 500;
const MEDIUM_DESCRIPTION_LEN: usize = 150;
const HIGH_DEPENDENCY_COUNT: usize = 3;

/// Snapshot of a task and its environment at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Situation {
    /// The task under consideration.
    pub task: Task,
    /// Worker roles currently available to take the task.
    pub available_roles: Vec<String>,
    /// Free-form context supplied by the caller.
    pub context: HashMap<String, Value>,
}

impl Situation {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            available_roles: Vec::new(),
            context: HashMap::new(),
        }
    }

    /// Add an available worker role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.available_roles.push(role.into());
        self
    }

    /// Attach a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Derive the per-decision analysis from this snapshot.
    pub fn analyze(&self) -> SituationAnalysis {
        let complexity = classify_complexity(&self.task);
        let required_resources = self
            .context
            .get("required_resources")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let base_minutes = match complexity {
            Complexity::Low => 15,
            Complexity::Medium => 60,
            Complexity::High => 240,
        };
        let estimated_minutes = base_minutes + 10 * self.task.depends_on.len() as u32;

        SituationAnalysis {
            complexity,
            dependencies: self.task.depends_on.clone(),
            required_resources,
            estimated_minutes,
            context: self.context.clone(),
        }
    }
}

/// Derived view of a situation used by the scoring components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationAnalysis {
    /// Complexity class of the task.
    pub complexity: Complexity,
    /// Dependency identifiers carried over from the task.
    pub dependencies: Vec<Uuid>,
    /// Resources the caller declared as required.
    pub required_resources: Vec<String>,
    /// Rough duration estimate in minutes.
    pub estimated_minutes: u32,
    /// Context echo for downstream consumers.
    pub context: HashMap<String, Value>,
}

fn classify_complexity(task: &Task) -> Complexity {
    let len = task.description.len();
    let deps = task.depends_on.len();
    if len > HIGH_DESCRIPTION_LEN || deps > HIGH_DEPENDENCY_COUNT {
        Complexity::High
    } else if len > MEDIUM_DESCRIPTION_LEN || deps >= 1 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}
