pub mod cancel;
pub mod config;
pub mod decision;
pub mod iteration;
pub mod scoring;
pub mod session;
pub mod situation;
pub mod task;

pub use cancel::CancellationToken;
pub use config::{
    AutonomyConfig, CircuitBreakerConfig, Config, ExecutorConfig, LearningConfig, LoggingConfig,
    ProgressConfig, SessionConfig, ValidationConfig,
};
pub use decision::{ActionResult, ActionTaken, AutonomyLevel, Decision};
pub use iteration::{IterationRecord, ValidationOutcome};
pub use scoring::{ConfidenceScore, RiskAssessment, RiskLevel};
pub use session::{IterationSummary, TaskSession};
pub use situation::{Complexity, Situation, SituationAnalysis};
pub use task::{Task, TaskStatus};
