//! The iterate-until-done control loop.
//!
//! Each iteration gates on the circuit breaker, invokes the worker,
//! detects side effects, optionally validates, records the outcome, and
//! checks the completion criteria. Worker failures are recorded and the
//! loop moves on; only the breaker, cancellation, or the iteration budget
//! stop it early.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    ActionResult, CancellationToken, ExecutorConfig, IterationRecord, Task, ValidationOutcome,
};
use crate::domain::ports::{ChangeDetector, ValidationRunner, Worker, WorkerInvocation};
use crate::services::{
    CircuitBreakerService, CompletionCriteria, ProgressTracker, SessionManager,
};

/// Per-execution knobs decided by the autonomy engine.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Role recorded on the session and reported to the worker.
    pub worker_role: String,
    /// Run the validation collaborator every iteration when the criteria
    /// demand any gate.
    pub validate_each_iteration: bool,
    /// Cooperative cancellation, checked at the top of each iteration.
    pub cancel: CancellationToken,
}

impl ExecutionOptions {
    pub fn new(worker_role: impl Into<String>, validate_each_iteration: bool) -> Self {
        Self {
            worker_role: worker_role.into(),
            validate_each_iteration,
            cancel: CancellationToken::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives a task to completion through repeated worker invocations.
#[derive(Clone)]
pub struct TaskExecutor {
    config: ExecutorConfig,
    worker: Arc<dyn Worker>,
    changes: Arc<dyn ChangeDetector>,
    validation: Arc<dyn ValidationRunner>,
    breaker: Arc<CircuitBreakerService>,
    tracker: Arc<ProgressTracker>,
    sessions: Arc<SessionManager>,
}

impl TaskExecutor {
    pub fn new(
        config: ExecutorConfig,
        worker: Arc<dyn Worker>,
        changes: Arc<dyn ChangeDetector>,
        validation: Arc<dyn ValidationRunner>,
        breaker: Arc<CircuitBreakerService>,
        tracker: Arc<ProgressTracker>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            worker,
            changes,
            validation,
            breaker,
            tracker,
            sessions,
        }
    }

    /// Run the full control loop until completion, abort, or budget
    /// exhaustion. Never returns an error; every outcome is an
    /// [`ActionResult`].
    #[instrument(skip(self, task, criteria, options), fields(task_id = %task.id, worker = self.worker.name()))]
    pub async fn execute(
        &self,
        task: &Task,
        criteria: &CompletionCriteria,
        options: &ExecutionOptions,
    ) -> ActionResult {
        if let Err(error) = self.changes.track_baseline(task.id).await {
            warn!(%error, "change baseline unavailable, detection degrades to empty");
        }

        let mut last_record: Option<IterationRecord> = None;
        for iteration in 1..=self.config.max_iterations {
            if options.cancel.is_cancelled() {
                info!(iteration, "execution cancelled");
                return ActionResult::aborted(
                    "execution cancelled",
                    false,
                    json!({ "iterations": iteration - 1 }),
                );
            }

            let stuck = self.tracker.is_stuck(task.id).await;
            let gate = self
                .breaker
                .check_should_continue(task.id, iteration, last_record.as_ref(), stuck)
                .await;
            if !gate.should_continue {
                warn!(iteration, reason = %gate.reason, "circuit breaker stopped execution");
                self.sessions.reset(task.id, &gate.reason).await;
                return ActionResult::aborted(
                    gate.reason.clone(),
                    true,
                    json!({
                        "iterations": iteration - 1,
                        "circuit_state": gate.state.as_str(),
                    }),
                );
            }

            let record = self.run_iteration(task, criteria, options, iteration).await;
            let record = self.tracker.record_iteration(task.id, record).await;
            self.sessions.record_iteration(task.id, &record).await;

            let evaluation = criteria.evaluate(&record);
            if evaluation.satisfied {
                info!(iteration, "completion criteria satisfied");
                return ActionResult::completed(json!({
                    "iterations": iteration,
                    "changed_files": record.changed_files,
                    "indicator_score": evaluation.indicator_score,
                    "output": record.worker_output,
                }));
            }
            debug!(iteration, unmet = ?evaluation.unmet, "completion criteria not met");

            last_record = Some(record);
            if iteration < self.config.max_iterations {
                tokio::time::sleep(Duration::from_millis(self.config.debounce_ms)).await;
            }
        }

        ActionResult::max_iterations_reached(
            format!(
                "no completion after {} iterations",
                self.config.max_iterations
            ),
            json!({
                "iterations": self.config.max_iterations,
                "changed_files": last_record.map(|r| r.changed_files).unwrap_or_default(),
            }),
        )
    }

    /// One worker invocation without the loop: produce a recommendation
    /// for a human instead of acting on it.
    #[instrument(skip(self, task, criteria, options), fields(task_id = %task.id))]
    pub async fn execute_advisory(
        &self,
        task: &Task,
        criteria: &CompletionCriteria,
        options: &ExecutionOptions,
    ) -> ActionResult {
        if let Err(error) = self.changes.track_baseline(task.id).await {
            warn!(%error, "change baseline unavailable, detection degrades to empty");
        }
        let record = self.run_iteration(task, criteria, options, 1).await;
        let record = self.tracker.record_iteration(task.id, record).await;
        self.sessions.record_iteration(task.id, &record).await;

        ActionResult::escalated(
            "assisted mode: recommendation requires human review",
            json!({
                "recommendation": record.worker_output,
                "changed_files": record.changed_files,
                "errors": record.errors,
            }),
        )
    }

    /// Invoke the worker once and assemble the draft iteration record.
    async fn run_iteration(
        &self,
        task: &Task,
        criteria: &CompletionCriteria,
        options: &ExecutionOptions,
        iteration: u32,
    ) -> IterationRecord {
        let session = self
            .sessions
            .get_or_create(task.id, &options.worker_role)
            .await;

        let mut context: HashMap<String, Value> = session.context.clone();
        context.insert("task_title".to_string(), json!(task.title));
        context.insert("iteration".to_string(), json!(iteration));
        context.insert(
            "previous_iterations".to_string(),
            json!(session.iterations.len()),
        );
        if let Some(last) = session.iterations.last() {
            context.insert("last_output".to_string(), json!(last.excerpt));
        }

        let request = WorkerInvocation {
            task_id: task.id,
            description: task.description.clone(),
            iteration,
            context,
        };

        let mut errors = Vec::new();
        let timeout = Duration::from_secs(self.config.worker_timeout_secs);
        let output = match tokio::time::timeout(timeout, self.worker.invoke(request)).await {
            Ok(Ok(reply)) => {
                if let Some(error) = reply.error {
                    errors.push(error);
                }
                reply.output
            }
            Ok(Err(error)) => {
                warn!(iteration, %error, "worker invocation failed");
                errors.push(error.to_string());
                String::new()
            }
            Err(_) => {
                warn!(
                    iteration,
                    timeout_secs = self.config.worker_timeout_secs,
                    "worker invocation timed out"
                );
                errors.push(format!(
                    "worker timed out after {}s",
                    self.config.worker_timeout_secs
                ));
                String::new()
            }
        };

        let changed_files = match self.changes.detect_changes(task.id, iteration).await {
            Ok(files) => files,
            Err(error) => {
                warn!(iteration, %error, "change detection failed, assuming no changes");
                Vec::new()
            }
        };

        let validation = if options.validate_each_iteration && criteria.needs_validation() {
            let outcome = self.run_validation(criteria, &mut errors).await;
            Some(outcome)
        } else {
            None
        };
        if let Some(outcome) = &validation {
            for failure in outcome.failures() {
                errors.push(failure.to_string());
            }
        }

        IterationRecord::new(iteration, changed_files, validation, output, errors)
    }

    /// Run only the gates the criteria demand.
    async fn run_validation(
        &self,
        criteria: &CompletionCriteria,
        errors: &mut Vec<String>,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        if criteria.require_tests_pass {
            let report = self.validation.run_tests().await;
            outcome.tests_passed = Some(report.passed);
        }
        if criteria.require_lint_pass {
            let report = self.validation.run_linter().await;
            outcome.linter_passed = Some(report.passed);
            if !report.passed {
                errors.extend(report.errors);
            }
        }
        if criteria.require_build_pass {
            let report = self.validation.run_build().await;
            outcome.build_succeeded = Some(report.succeeded);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        CircuitBreakerConfig, ProgressConfig, SessionConfig, ValidationOutcome,
    };
    use crate::domain::ports::{BuildReport, LintReport, TestReport, WorkerReply};
    use crate::domain::DomainResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct ScriptedWorker {
        replies: Mutex<Vec<DomainResult<WorkerReply>>>,
    }

    impl ScriptedWorker {
        fn new(replies: Vec<DomainResult<WorkerReply>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl Worker for ScriptedWorker {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn invoke(
            &self,
            _request: crate::domain::ports::WorkerInvocation,
        ) -> DomainResult<WorkerReply> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(WorkerReply::ok("Working..."))
            } else {
                replies.remove(0)
            }
        }
    }

    struct NoChanges;

    #[async_trait]
    impl ChangeDetector for NoChanges {
        async fn track_baseline(&self, _task_id: Uuid) -> DomainResult<()> {
            Ok(())
        }

        async fn detect_changes(&self, _task_id: Uuid, _iteration: u32) -> DomainResult<Vec<String>> {
            Ok(vec![])
        }
    }

    struct SingleChange;

    #[async_trait]
    impl ChangeDetector for SingleChange {
        async fn track_baseline(&self, _task_id: Uuid) -> DomainResult<()> {
            Ok(())
        }

        async fn detect_changes(&self, _task_id: Uuid, _iteration: u32) -> DomainResult<Vec<String>> {
            Ok(vec!["src/lib.rs".to_string()])
        }
    }

    struct PassingValidation;

    #[async_trait]
    impl ValidationRunner for PassingValidation {
        async fn run_tests(&self) -> TestReport {
            TestReport {
                passed: true,
                output: String::new(),
                coverage: None,
            }
        }

        async fn run_linter(&self) -> LintReport {
            LintReport {
                passed: true,
                output: String::new(),
                errors: vec![],
            }
        }

        async fn run_build(&self) -> BuildReport {
            BuildReport {
                succeeded: true,
                output: String::new(),
                artifacts: vec![],
            }
        }
    }

    fn executor(worker: ScriptedWorker, max_iterations: u32, dir: &TempDir) -> TaskExecutor {
        let config = ExecutorConfig {
            max_iterations,
            debounce_ms: 1,
            worker_timeout_secs: 5,
        };
        TaskExecutor::new(
            config,
            Arc::new(worker),
            Arc::new(NoChanges),
            Arc::new(PassingValidation),
            Arc::new(CircuitBreakerService::new(CircuitBreakerConfig::disabled())),
            Arc::new(ProgressTracker::new(ProgressConfig::default(), dir.path())),
            Arc::new(SessionManager::new(SessionConfig::default(), dir.path())),
        )
    }

    #[tokio::test]
    async fn test_cancellation_aborts_before_work() {
        let dir = TempDir::new().unwrap();
        let exec = executor(ScriptedWorker::new(vec![]), 10, &dir);
        let task = Task::new("t", "d");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = ExecutionOptions::new("engineer", false).with_cancel(cancel);

        let result = exec
            .execute(&task, &CompletionCriteria::general(), &options)
            .await;
        assert!(!result.success);
        assert_eq!(
            result.action_taken,
            crate::domain::models::ActionTaken::Aborted
        );
        assert!(!result.escalated);
    }

    #[tokio::test]
    async fn test_satisfied_first_iteration_completes_immediately() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(vec![Ok(WorkerReply::ok(
            "Task completed. EXIT_SIGNAL: true. All done.",
        ))]);
        let config = ExecutorConfig {
            max_iterations: 10,
            debounce_ms: 1,
            worker_timeout_secs: 5,
        };
        let exec = TaskExecutor::new(
            config,
            Arc::new(worker),
            Arc::new(SingleChange),
            Arc::new(PassingValidation),
            Arc::new(CircuitBreakerService::new(CircuitBreakerConfig::disabled())),
            Arc::new(ProgressTracker::new(ProgressConfig::default(), dir.path())),
            Arc::new(SessionManager::new(SessionConfig::default(), dir.path())),
        );
        let task = Task::new("t", "d");
        let options = ExecutionOptions::new("engineer", false);

        let result = exec
            .execute(&task, &CompletionCriteria::general(), &options)
            .await;
        assert!(result.success);
        assert_eq!(
            result.action_taken,
            crate::domain::models::ActionTaken::Completed
        );
        assert_eq!(result.result["iterations"], 1);
    }

    #[tokio::test]
    async fn test_worker_error_recorded_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(vec![
            Err(crate::domain::DomainError::WorkerFailed {
                task_id: Uuid::new_v4(),
                reason: "transport closed".to_string(),
            }),
            Ok(WorkerReply::ok("All done. EXIT_SIGNAL: true")),
        ]);
        let exec = executor(worker, 5, &dir);
        let task = Task::new("t", "d");
        let options = ExecutionOptions::new("engineer", false);

        let result = exec
            .execute(&task, &CompletionCriteria::general(), &options)
            .await;
        assert!(result.success, "second iteration should complete");
        assert_eq!(result.result["iterations"], 2);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_escalates() {
        let dir = TempDir::new().unwrap();
        let exec = executor(ScriptedWorker::new(vec![]), 3, &dir);
        let task = Task::new("t", "d");
        let options = ExecutionOptions::new("engineer", false);

        let result = exec
            .execute(&task, &CompletionCriteria::general(), &options)
            .await;
        assert!(!result.success);
        assert_eq!(
            result.action_taken,
            crate::domain::models::ActionTaken::MaxIterationsReached
        );
        assert!(result.escalated);
        assert_eq!(result.result["iterations"], 3);
    }

    #[tokio::test]
    async fn test_advisory_never_succeeds() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(vec![Ok(WorkerReply::ok(
            "All done. EXIT_SIGNAL: true",
        ))]);
        let exec = executor(worker, 5, &dir);
        let task = Task::new("t", "d");
        let options = ExecutionOptions::new("engineer", false);

        let result = exec
            .execute_advisory(&task, &CompletionCriteria::general(), &options)
            .await;
        assert!(!result.success);
        assert!(result.escalated);
        assert_eq!(
            result.result["recommendation"],
            "All done. EXIT_SIGNAL: true"
        );
    }

    #[tokio::test]
    async fn test_validation_skipped_when_not_required() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(vec![Ok(WorkerReply::ok("Working..."))]);
        let exec = executor(worker, 1, &dir);
        let task = Task::new("t", "d");
        // Validation enabled but the general preset demands no gates.
        let options = ExecutionOptions::new("engineer", true);

        exec.execute(&task, &CompletionCriteria::general(), &options)
            .await;
        let history = exec.tracker.history(task.id).await;
        assert_eq!(history.len(), 1);
        assert!(history[0].validation.is_none());
    }

    #[tokio::test]
    async fn test_validation_outcome_recorded_when_demanded() {
        let dir = TempDir::new().unwrap();
        let worker = ScriptedWorker::new(vec![Ok(WorkerReply::ok("Working..."))]);
        let exec = executor(worker, 1, &dir);
        let task = Task::new("t", "d").with_tag("docs");
        let options = ExecutionOptions::new("writer", true);

        exec.execute(&task, &CompletionCriteria::documentation(), &options)
            .await;
        let history = exec.tracker.history(task.id).await;
        assert_eq!(
            history[0].validation,
            Some(ValidationOutcome {
                tests_passed: None,
                linter_passed: Some(true),
                build_succeeded: None,
            })
        );
    }
}
