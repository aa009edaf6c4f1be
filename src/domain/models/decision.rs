//! Autonomy decisions and caller-facing results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::scoring::{ConfidenceScore, RiskAssessment};

/// How much independent action is permitted for a task.
///
/// Levels order from "escalate to a human" (1) up to "act fully
/// independently" (4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Level 1: escalate, perform no work.
    Manual = 1,
    /// Level 2: one non-looping attempt, surfaced as a recommendation.
    Assisted = 2,
    /// Level 3: autonomous with validation every iteration.
    Supervised = 3,
    /// Level 4: fully autonomous.
    Autonomous = 4,
}

impl AutonomyLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Manual),
            2 => Some(Self::Assisted),
            3 => Some(Self::Supervised),
            4 => Some(Self::Autonomous),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Assisted => "assisted",
            Self::Supervised => "supervised",
            Self::Autonomous => "autonomous",
        }
    }

    /// Levels 3 and 4 act without prior human approval.
    pub fn is_autonomous(&self) -> bool {
        *self >= Self::Supervised
    }
}

/// Outcome of scoring a situation, before any work happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Assigned autonomy level.
    pub level: AutonomyLevel,
    /// Whether the engine may act without approval. Always equals
    /// `level.is_autonomous()`.
    pub autonomous: bool,
    /// Confidence behind the decision.
    pub confidence: ConfidenceScore,
    /// Risk behind the decision.
    pub risk: RiskAssessment,
    /// Action tag: execute, recommend, escalate, or blocked.
    pub action: String,
    /// Why this level was assigned.
    pub reasoning: String,
    /// Present when the decision sends the task to a human.
    pub escalation_reason: Option<String>,
}

/// Terminal action tag carried on an [`ActionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Completed,
    Aborted,
    MaxIterationsReached,
    Blocked,
    Escalated,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::Blocked => "blocked",
            Self::Escalated => "escalated",
        }
    }
}

/// The only thing returned to the caller of `decide`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// True only when the task completed autonomously.
    pub success: bool,
    /// What the engine did.
    pub action_taken: ActionTaken,
    /// Opaque result payload (completion details, recommendation, ...).
    pub result: Value,
    /// Whether a human needs to look at this.
    pub escalated: bool,
    /// Why, when `escalated` is true.
    pub escalation_reason: Option<String>,
}

impl ActionResult {
    /// Successful autonomous completion.
    pub fn completed(result: Value) -> Self {
        Self {
            success: true,
            action_taken: ActionTaken::Completed,
            result,
            escalated: false,
            escalation_reason: None,
        }
    }

    /// Early termination (circuit breaker or cancellation).
    pub fn aborted(reason: impl Into<String>, escalated: bool, result: Value) -> Self {
        let reason = reason.into();
        Self {
            success: false,
            action_taken: ActionTaken::Aborted,
            result,
            escalated,
            escalation_reason: Some(reason),
        }
    }

    /// Iteration budget exhausted without completion.
    pub fn max_iterations_reached(reason: impl Into<String>, result: Value) -> Self {
        Self {
            success: false,
            action_taken: ActionTaken::MaxIterationsReached,
            result,
            escalated: true,
            escalation_reason: Some(reason.into()),
        }
    }

    /// Policy denial, no work performed.
    pub fn blocked(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            success: false,
            action_taken: ActionTaken::Blocked,
            result: Value::Null,
            escalated: true,
            escalation_reason: Some(reason),
        }
    }

    /// Escalation to a human, with whatever context is available.
    pub fn escalated(reason: impl Into<String>, result: Value) -> Self {
        Self {
            success: false,
            action_taken: ActionTaken::Escalated,
            result,
            escalated: true,
            escalation_reason: Some(reason.into()),
        }
    }
}
