//! Infrastructure adapters.
//!
//! Concrete implementations of the domain ports plus process-level
//! concerns: configuration loading, logging, git-based change detection,
//! and command-backed validation gates.

pub mod command_validation;
pub mod config;
pub mod git_changes;
pub mod logging;

pub use command_validation::CommandValidationRunner;
pub use config::{ConfigError, ConfigLoader};
pub use git_changes::GitChangeDetector;
pub use logging::Logger;
