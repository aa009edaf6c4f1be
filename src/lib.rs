//! Pitboss - Autonomous Task Execution Control
//!
//! Pitboss decides how much autonomy an automated worker should get for a
//! given task, then supervises the execution it grants. Confidence and
//! risk scoring assign one of four autonomy levels, a circuit breaker
//! halts runs that stop making progress, and completion detection tells
//! apart "the worker said done" from "the work is done".
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic, models, and port traits
//! - **Application Layer** (`application`): The autonomy engine and task executor
//! - **Service Layer** (`services`): Scoring, learning, progress, and completion logic
//! - **Infrastructure Layer** (`infrastructure`): Git, shell, config, and logging adapters
//!
//! # Example
//!
//! ```ignore
//! use pitboss::application::AutonomyEngine;
//! use pitboss::domain::models::Situation;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Build an engine, describe the situation, let it decide and act
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{assign_level, AutonomyEngine, ExecutionOptions, TaskExecutor};
pub use domain::models::{
    ActionResult, AutonomyConfig, AutonomyLevel, Config, Decision, IterationRecord, Situation,
    Task, TaskStatus, ValidationOutcome,
};
pub use domain::ports::{ChangeDetector, PolicyEngine, ValidationRunner, Worker};
pub use infrastructure::{CommandValidationRunner, ConfigLoader, GitChangeDetector};
pub use services::{
    CircuitBreakerService, CompletionCriteria, ConfidenceCalculator, DecisionHistory,
    LearningEngine, ProgressTracker, RiskAssessor, SessionManager,
};
