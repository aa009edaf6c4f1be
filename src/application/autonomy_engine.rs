//! The autonomy decision engine.
//!
//! Scores a situation, assigns an autonomy level, consults the policy
//! engine, dispatches to the task executor, and records the outcome for
//! learning. `decide` never returns an error; anything the engine cannot
//! handle autonomously surfaces as an escalated [`ActionResult`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::application::task_executor::{ExecutionOptions, TaskExecutor};
use crate::domain::models::{
    ActionResult, ActionTaken, AutonomyConfig, AutonomyLevel, CancellationToken, Config, Decision,
    Situation, Task, TaskStatus,
};
use crate::domain::ports::{AllowAllPolicy, PolicyDecision, PolicyEngine};
use crate::services::{
    CompletionCriteria, ConfidenceCalculator, DecisionHistory, DecisionRecord, LearnedThresholds,
    LearningEngine, RiskAssessor,
};

/// Decides how autonomously each task may run, then runs it.
#[derive(Clone)]
pub struct AutonomyEngine {
    config: AutonomyConfig,
    confidence: ConfidenceCalculator,
    risk: RiskAssessor,
    history: Arc<DecisionHistory>,
    learning: Arc<LearningEngine>,
    policy: Arc<dyn PolicyEngine>,
    executor: Arc<TaskExecutor>,
}

impl AutonomyEngine {
    /// Build an engine from configuration with the default allow-all
    /// policy. Swap the policy with [`Self::with_policy`].
    pub fn new(config: &Config, executor: Arc<TaskExecutor>) -> Self {
        let confidence = ConfidenceCalculator::new(
            config.autonomy.role_reliability.clone(),
            config.autonomy.unknown_role_reliability,
        );
        Self {
            config: config.autonomy.clone(),
            confidence,
            risk: RiskAssessor::new(),
            history: Arc::new(DecisionHistory::new(config.autonomy.history_limit)),
            learning: Arc::new(LearningEngine::new(config.learning.clone())),
            policy: Arc::new(AllowAllPolicy),
            executor,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    /// Score a situation without acting on it.
    #[instrument(skip(self, situation), fields(task_id = %situation.task.id))]
    pub async fn evaluate(&self, situation: &Situation) -> Decision {
        let analysis = situation.analyze();
        let similar = self.history.find_similar(&situation.task.title).await;
        let confidence = self.confidence.calculate(situation, &analysis, &similar);
        let risk = self.risk.assess(situation, &analysis);
        let thresholds = self.learning.thresholds().await;

        match self.policy.evaluate(situation) {
            PolicyDecision::Deny { reason } => {
                info!(%reason, "policy denied the task");
                Decision {
                    level: AutonomyLevel::Manual,
                    autonomous: false,
                    reasoning: format!("policy denied: {reason}"),
                    escalation_reason: Some(reason),
                    action: "blocked".to_string(),
                    confidence,
                    risk,
                }
            }
            PolicyDecision::RequireApproval { reason } => {
                let assigned = assign_level(
                    confidence.value,
                    risk.total_risk,
                    &thresholds,
                    &self.config,
                );
                let level = assigned.min(AutonomyLevel::Assisted);
                Decision {
                    level,
                    autonomous: false,
                    reasoning: format!(
                        "capped at {} pending approval: {reason}",
                        level.as_str()
                    ),
                    escalation_reason: (level == AutonomyLevel::Manual)
                        .then(|| format!("approval required: {reason}")),
                    action: action_for(level).to_string(),
                    confidence,
                    risk,
                }
            }
            PolicyDecision::Allow => {
                let level = assign_level(
                    confidence.value,
                    risk.total_risk,
                    &thresholds,
                    &self.config,
                );
                let reasoning = format!(
                    "confidence {:.2} (level3 gate {:.2}, level4 gate {:.2}), risk {:.2} ({})",
                    confidence.value,
                    thresholds.level3,
                    thresholds.level4,
                    risk.total_risk,
                    risk.level.as_str()
                );
                Decision {
                    level,
                    autonomous: level.is_autonomous(),
                    escalation_reason: (level == AutonomyLevel::Manual)
                        .then(|| reasoning.clone()),
                    action: action_for(level).to_string(),
                    reasoning,
                    confidence,
                    risk,
                }
            }
        }
    }

    /// Decide and act. The single entry point for callers.
    pub async fn decide(&self, situation: Situation) -> ActionResult {
        self.decide_cancellable(situation, CancellationToken::new())
            .await
    }

    /// [`Self::decide`] with cooperative cancellation attached to any
    /// executor run it dispatches.
    #[instrument(skip(self, situation, cancel), fields(task_id = %situation.task.id, title = %situation.task.title))]
    pub async fn decide_cancellable(
        &self,
        situation: Situation,
        cancel: CancellationToken,
    ) -> ActionResult {
        let decision = self.evaluate(&situation).await;
        info!(
            level = decision.level.as_u8(),
            action = %decision.action,
            confidence = decision.confidence.value,
            risk = decision.risk.total_risk,
            "autonomy decision"
        );

        let mut task = situation.task.clone();
        let criteria = CompletionCriteria::for_task(&task);
        let role = self.confidence.best_role(&situation.available_roles);

        let mut result = if decision.action == "blocked" {
            let reason = decision
                .escalation_reason
                .clone()
                .unwrap_or_else(|| decision.reasoning.clone());
            ActionResult::blocked(reason)
        } else {
            match decision.level {
                AutonomyLevel::Manual => {
                    let reason = decision
                        .escalation_reason
                        .clone()
                        .unwrap_or_else(|| decision.reasoning.clone());
                    ActionResult::escalated(
                        reason,
                        json!({
                            "level": decision.level.as_u8(),
                            "confidence": decision.confidence.value,
                            "risk": decision.risk.total_risk,
                        }),
                    )
                }
                AutonomyLevel::Assisted => {
                    self.transition(&mut task, TaskStatus::InProgress);
                    let options =
                        ExecutionOptions::new(role.clone(), false).with_cancel(cancel.clone());
                    self.executor
                        .execute_advisory(&task, &criteria, &options)
                        .await
                }
                AutonomyLevel::Supervised | AutonomyLevel::Autonomous => {
                    self.transition(&mut task, TaskStatus::InProgress);
                    let validate = decision.level == AutonomyLevel::Supervised;
                    let options =
                        ExecutionOptions::new(role.clone(), validate).with_cancel(cancel.clone());
                    self.executor.execute(&task, &criteria, &options).await
                }
            }
        };

        if task.status == TaskStatus::InProgress {
            let terminal = match result.action_taken {
                ActionTaken::Completed => TaskStatus::Done,
                ActionTaken::Escalated => TaskStatus::Pending,
                ActionTaken::Aborted
                | ActionTaken::MaxIterationsReached
                | ActionTaken::Blocked => TaskStatus::Blocked,
            };
            self.transition(&mut task, terminal);
        }
        if let Value::Object(map) = &mut result.result {
            map.insert("task_status".to_string(), json!(task.status.as_str()));
        }

        self.history
            .record(DecisionRecord {
                task_title: task.title.clone(),
                level: decision.level,
                confidence: decision.confidence.value,
                risk: decision.risk.total_risk,
                action_taken: result.action_taken,
                success: result.success,
                recorded_at: Utc::now(),
            })
            .await;
        self.learning.record_outcome(result.success).await;

        result
    }

    /// Current learned thresholds, exposed for observability.
    pub async fn thresholds(&self) -> LearnedThresholds {
        self.learning.thresholds().await
    }

    fn transition(&self, task: &mut Task, status: TaskStatus) {
        if let Err(reason) = task.transition_to(status) {
            warn!(task_id = %task.id, %reason, "skipping invalid status transition");
        }
    }
}

/// Level assignment, first match wins. Confidence gates for levels 3 and
/// 4 come from the learning engine; risk ceilings are static config.
pub fn assign_level(
    confidence: f64,
    risk: f64,
    thresholds: &LearnedThresholds,
    config: &AutonomyConfig,
) -> AutonomyLevel {
    if confidence >= thresholds.level4 && risk <= config.level4_max_risk {
        AutonomyLevel::Autonomous
    } else if confidence >= thresholds.level3 && risk <= config.level3_max_risk {
        AutonomyLevel::Supervised
    } else if confidence >= config.level2_min_confidence && risk <= config.level2_max_risk {
        AutonomyLevel::Assisted
    } else {
        AutonomyLevel::Manual
    }
}

fn action_for(level: AutonomyLevel) -> &'static str {
    match level {
        AutonomyLevel::Autonomous | AutonomyLevel::Supervised => "execute",
        AutonomyLevel::Assisted => "recommend",
        AutonomyLevel::Manual => "escalate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        CircuitBreakerConfig, ExecutorConfig, ProgressConfig, SessionConfig,
    };
    use crate::domain::ports::{
        BuildReport, ChangeDetector, DenyListPolicy, LintReport, TestReport, ValidationRunner,
        Worker, WorkerInvocation, WorkerReply,
    };
    use crate::domain::{DomainError, DomainResult};
    use crate::services::{CircuitBreakerService, ProgressTracker, SessionManager};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct EchoWorker {
        output: &'static str,
    }

    #[async_trait]
    impl Worker for EchoWorker {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn invoke(&self, _request: WorkerInvocation) -> DomainResult<WorkerReply> {
            Ok(WorkerReply::ok(self.output))
        }
    }

    struct OneFileChanged;

    #[async_trait]
    impl ChangeDetector for OneFileChanged {
        async fn track_baseline(&self, _task_id: Uuid) -> DomainResult<()> {
            Ok(())
        }

        async fn detect_changes(&self, _task_id: Uuid, _iteration: u32) -> DomainResult<Vec<String>> {
            Ok(vec!["src/lib.rs".to_string()])
        }
    }

    struct AllGreen;

    #[async_trait]
    impl ValidationRunner for AllGreen {
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

    fn engine(output: &'static str, dir: &TempDir) -> AutonomyEngine {
        let config = Config::default();
        let executor = TaskExecutor::new(
            ExecutorConfig {
                max_iterations: 3,
                debounce_ms: 1,
                worker_timeout_secs: 5,
            },
            Arc::new(EchoWorker { output }),
            Arc::new(OneFileChanged),
            Arc::new(AllGreen),
            Arc::new(CircuitBreakerService::new(CircuitBreakerConfig::disabled())),
            Arc::new(ProgressTracker::new(ProgressConfig::default(), dir.path())),
            Arc::new(SessionManager::new(SessionConfig::default(), dir.path())),
        );
        AutonomyEngine::new(&config, Arc::new(executor))
    }

    fn calm_situation() -> Situation {
        Situation::new(Task::new("Tidy imports", "Sort the use blocks").with_priority(1))
            .with_role("engineer")
            .with_context("repo", json!("billing-api"))
            .with_context("branch", json!("main"))
            .with_context("module", json!("imports"))
    }

    #[tokio::test]
    async fn test_low_risk_familiar_task_reaches_supervised() {
        let dir = TempDir::new().unwrap();
        let engine = engine("All done. EXIT_SIGNAL: true", &dir);
        // Seed history so the historical factor is strong.
        for _ in 0..4 {
            engine
                .history
                .record(DecisionRecord {
                    task_title: "Tidy imports".to_string(),
                    level: AutonomyLevel::Supervised,
                    confidence: 0.85,
                    risk: 0.2,
                    action_taken: ActionTaken::Completed,
                    success: true,
                    recorded_at: Utc::now(),
                })
                .await;
        }
        let decision = engine.evaluate(&calm_situation()).await;
        assert!(decision.level >= AutonomyLevel::Supervised, "got {:?}", decision.level);
        assert!(decision.autonomous);
        assert_eq!(decision.action, "execute");
    }

    #[tokio::test]
    async fn test_critical_risk_forces_manual() {
        let dir = TempDir::new().unwrap();
        let engine = engine("All done. EXIT_SIGNAL: true", &dir);
        let situation = Situation::new(
            Task::new("Rotate secrets", "Replace the payment token everywhere").with_priority(5),
        )
        .with_role("engineer");
        let decision = engine.evaluate(&situation).await;
        assert_eq!(decision.level, AutonomyLevel::Manual);
        assert!(!decision.autonomous);
        assert!(decision.escalation_reason.is_some());
    }

    #[tokio::test]
    async fn test_deny_policy_blocks_without_work() {
        let dir = TempDir::new().unwrap();
        let policy = DenyListPolicy::new(vec!["drop table".to_string()], Vec::<String>::new());
        let engine = engine("unused", &dir).with_policy(Arc::new(policy));
        let situation =
            Situation::new(Task::new("Cleanup", "drop table customers")).with_role("engineer");

        let result = engine.decide(situation).await;
        assert!(!result.success);
        assert_eq!(result.action_taken, ActionTaken::Blocked);
        assert!(result.escalated);
    }

    #[tokio::test]
    async fn test_approval_policy_caps_at_assisted() {
        let dir = TempDir::new().unwrap();
        let policy = DenyListPolicy::new(Vec::<String>::new(), vec!["production".to_string()]);
        let engine = engine("Recommendation text", &dir).with_policy(Arc::new(policy));
        let situation = Situation::new(
            Task::new("Deploy", "Roll the production config forward").with_priority(1),
        )
        .with_role("engineer");

        let decision = engine.evaluate(&situation).await;
        assert!(decision.level <= AutonomyLevel::Assisted);
        assert!(!decision.autonomous);
    }

    #[tokio::test]
    async fn test_decision_recorded_regardless_of_level() {
        let dir = TempDir::new().unwrap();
        let engine = engine("unused", &dir);
        let situation = Situation::new(
            Task::new("Rotate secrets", "Replace the payment token everywhere").with_priority(5),
        );
        assert!(engine.history.is_empty().await);
        let result = engine.decide(situation).await;
        assert_eq!(result.action_taken, ActionTaken::Escalated);
        assert_eq!(engine.history.len().await, 1);
        let rate = engine.learning.window_success_rate().await;
        assert_eq!(rate, Some(0.0));
    }

    #[tokio::test]
    async fn test_completed_run_marks_task_done() {
        let dir = TempDir::new().unwrap();
        let engine = engine("All done. EXIT_SIGNAL: true", &dir);
        for _ in 0..4 {
            engine
                .history
                .record(DecisionRecord {
                    task_title: "Tidy imports".to_string(),
                    level: AutonomyLevel::Supervised,
                    confidence: 0.85,
                    risk: 0.2,
                    action_taken: ActionTaken::Completed,
                    success: true,
                    recorded_at: Utc::now(),
                })
                .await;
        }
        let result = engine.decide(calm_situation()).await;
        assert!(result.success, "result: {result:?}");
        assert_eq!(result.result["task_status"], "done");
    }

    #[test]
    fn test_assign_level_first_match_wins() {
        let config = AutonomyConfig::default();
        let thresholds = LearnedThresholds {
            level3: 0.80,
            level4: 0.90,
        };
        assert_eq!(
            assign_level(0.95, 0.1, &thresholds, &config),
            AutonomyLevel::Autonomous
        );
        assert_eq!(
            assign_level(0.95, 0.3, &thresholds, &config),
            AutonomyLevel::Supervised
        );
        assert_eq!(
            assign_level(0.85, 0.3, &thresholds, &config),
            AutonomyLevel::Supervised
        );
        assert_eq!(
            assign_level(0.85, 0.5, &thresholds, &config),
            AutonomyLevel::Assisted
        );
        assert_eq!(
            assign_level(0.65, 0.5, &thresholds, &config),
            AutonomyLevel::Assisted
        );
        assert_eq!(
            assign_level(0.65, 0.7, &thresholds, &config),
            AutonomyLevel::Manual
        );
        assert_eq!(
            assign_level(0.4, 0.1, &thresholds, &config),
            AutonomyLevel::Manual
        );
    }

    #[tokio::test]
    async fn test_worker_error_type_is_recordable() {
        // DomainError must format cleanly into iteration error lists.
        let error = DomainError::WorkerFailed {
            task_id: Uuid::new_v4(),
            reason: "transport closed".to_string(),
        };
        assert!(error.to_string().contains("transport closed"));
    }
}
