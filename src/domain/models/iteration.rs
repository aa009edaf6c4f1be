//! Per-iteration records, the single source of truth consulted by the
//! circuit breaker and the completion criteria.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of running the validation collaborator for one iteration.
///
/// A `None` gate means that gate was not run (no command configured or
/// validation skipped this iteration); the completion criteria treat it
/// as an automatic pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub tests_passed: Option<bool>,
    pub linter_passed: Option<bool>,
    pub build_succeeded: Option<bool>,
}

impl ValidationOutcome {
    /// True when every gate that ran passed and at least one gate ran.
    pub fn passed(&self) -> bool {
        let gates = [self.tests_passed, self.linter_passed, self.build_succeeded];
        gates.iter().any(Option::is_some) && gates.iter().flatten().all(|passed| *passed)
    }

    /// Short tags for the gates that ran and failed.
    pub fn failures(&self) -> Vec<&'static str> {
        let mut failures = Vec::new();
        if self.tests_passed == Some(false) {
            failures.push("tests failed");
        }
        if self.linter_passed == Some(false) {
            failures.push("linter failed");
        }
        if self.build_succeeded == Some(false) {
            failures.push("build failed");
        }
        failures
    }
}

/// What happened during one iteration of a task's control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    /// When the record was taken.
    pub recorded_at: DateTime<Utc>,
    /// Files changed since the task baseline.
    pub changed_files: Vec<String>,
    /// Validation outcome, when validation ran.
    pub validation: Option<ValidationOutcome>,
    /// Raw worker output for this iteration.
    pub worker_output: String,
    /// Errors observed this iteration (worker and validation).
    pub errors: Vec<String>,
    /// Derived by the progress tracker against the previous record.
    pub has_progress: bool,
}

impl IterationRecord {
    pub fn new(
        iteration: u32,
        changed_files: Vec<String>,
        validation: Option<ValidationOutcome>,
        worker_output: impl Into<String>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            iteration,
            recorded_at: Utc::now(),
            changed_files,
            validation,
            worker_output: worker_output.into(),
            errors,
            has_progress: false,
        }
    }

    /// Error fingerprint for set comparisons, order-insensitive.
    pub fn error_set(&self) -> BTreeSet<&str> {
        self.errors.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_passed() {
        let outcome = ValidationOutcome {
            tests_passed: Some(true),
            linter_passed: Some(true),
            build_succeeded: None,
        };
        assert!(outcome.passed());

        let outcome = ValidationOutcome {
            tests_passed: Some(true),
            linter_passed: Some(false),
            build_succeeded: None,
        };
        assert!(!outcome.passed());
    }

    #[test]
    fn test_nothing_ran_is_not_a_pass() {
        assert!(!ValidationOutcome::default().passed());
    }

    #[test]
    fn test_failure_tags() {
        let outcome = ValidationOutcome {
            tests_passed: Some(false),
            linter_passed: Some(true),
            build_succeeded: Some(false),
        };
        assert_eq!(outcome.failures(), vec!["tests failed", "build failed"]);
    }

    #[test]
    fn test_error_set_ignores_order_and_duplicates() {
        let a = IterationRecord::new(
            1,
            vec![],
            None,
            "",
            vec!["E1".to_string(), "E2".to_string(), "E1".to_string()],
        );
        let b = IterationRecord::new(2, vec![], None, "", vec!["E2".to_string(), "E1".to_string()]);
        assert_eq!(a.error_set(), b.error_set());
    }
}
