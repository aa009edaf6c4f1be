//! Validation port - test, linter, and build gates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    pub output: String,
    /// Coverage percentage when the runner reports one.
    pub coverage: Option<f64>,
}

/// Result of a linter run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintReport {
    pub passed: bool,
    pub output: String,
    /// Individual error lines extracted from the output.
    pub errors: Vec<String>,
}

/// Result of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub succeeded: bool,
    pub output: String,
    /// Artifacts the build produced, when known.
    pub artifacts: Vec<String>,
}

/// Runs the external validation commands.
///
/// These calls never fail: a missing command is an automatic pass, a
/// timeout or crashed process is a failed report. The reports are data,
/// not errors.
#[async_trait]
pub trait ValidationRunner: Send + Sync {
    async fn run_tests(&self) -> TestReport;

    async fn run_linter(&self) -> LintReport;

    async fn run_build(&self) -> BuildReport;
}
