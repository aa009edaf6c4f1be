pub mod circuit_breaker;
pub mod completion;
pub mod confidence;
pub mod history;
pub mod learning;
pub mod progress_tracker;
pub mod risk;
pub mod session_manager;

pub use circuit_breaker::{CircuitBreakerResult, CircuitBreakerService, CircuitState, CircuitStats};
pub use completion::{CompletionCriteria, CompletionEvaluation, TaskType};
pub use confidence::ConfidenceCalculator;
pub use history::{DecisionHistory, DecisionRecord};
pub use learning::{LearnedThresholds, LearningEngine};
pub use progress_tracker::ProgressTracker;
pub use risk::RiskAssessor;
pub use session_manager::SessionManager;
