//! Policy port - pluggable rule checks consulted before any work starts.

use serde::{Deserialize, Serialize};

use crate::domain::models::Situation;

/// Verdict of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// No objection; the level assignment proceeds normally.
    Allow,
    /// Work may be prepared but not applied without a human sign-off.
    /// Caps the autonomy level at 2.
    RequireApproval { reason: String },
    /// No work at all; short-circuits to level 1 "blocked".
    Deny { reason: String },
}

impl PolicyDecision {
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Rule check evaluated once per decision, before scoring dispatch.
///
/// Evaluation is a pure computation over the situation snapshot; it must
/// not perform I/O or block.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, situation: &Situation) -> PolicyDecision;
}

/// Default policy: allows everything. The historical behavior of the
/// system before policies were pluggable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl PolicyEngine for AllowAllPolicy {
    fn evaluate(&self, _situation: &Situation) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Keyword policy: denies descriptions matching a block list and demands
/// approval for descriptions matching a review list.
#[derive(Debug, Clone, Default)]
pub struct DenyListPolicy {
    deny_patterns: Vec<String>,
    approval_patterns: Vec<String>,
}

impl DenyListPolicy {
    pub fn new(
        deny_patterns: impl IntoIterator<Item = impl Into<String>>,
        approval_patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let lower = |patterns: Vec<String>| -> Vec<String> {
            patterns.iter().map(|p| p.to_lowercase()).collect()
        };
        Self {
            deny_patterns: lower(deny_patterns.into_iter().map(Into::into).collect()),
            approval_patterns: lower(approval_patterns.into_iter().map(Into::into).collect()),
        }
    }
}

impl PolicyEngine for DenyListPolicy {
    fn evaluate(&self, situation: &Situation) -> PolicyDecision {
        let haystack = format!(
            "{} {}",
            situation.task.title.to_lowercase(),
            situation.task.description.to_lowercase()
        );
        if let Some(pattern) = self.deny_patterns.iter().find(|p| haystack.contains(*p)) {
            return PolicyDecision::Deny {
                reason: format!("description matches blocked pattern '{pattern}'"),
            };
        }
        if let Some(pattern) = self
            .approval_patterns
            .iter()
            .find(|p| haystack.contains(*p))
        {
            return PolicyDecision::RequireApproval {
                reason: format!("description matches review pattern '{pattern}'"),
            };
        }
        PolicyDecision::Allow
    }
}
