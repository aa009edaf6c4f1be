//! Validation gates backed by configured shell commands.
//!
//! Each gate runs its configured command with a timeout and judges the
//! exit status. An unconfigured gate passes automatically so that tasks
//! in projects without, say, a linter are not blocked on one. Reports are
//! always returned; a timeout or spawn failure becomes a failed report,
//! never an error.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::domain::models::ValidationConfig;
use crate::domain::ports::{BuildReport, LintReport, TestReport, ValidationRunner};

/// [`ValidationRunner`] that shells out to configured commands.
#[derive(Debug, Clone)]
pub struct CommandValidationRunner {
    config: ValidationConfig,
}

struct CommandOutcome {
    success: bool,
    output: String,
}

impl CommandValidationRunner {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    async fn run_command(&self, command_line: &str, timeout_secs: u64) -> CommandOutcome {
        let mut parts = command_line.split_whitespace();
        let Some(program) = parts.next() else {
            return CommandOutcome {
                success: true,
                output: "empty command, skipping".to_string(),
            };
        };

        let mut command = Command::new(program);
        command
            .args(parts)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let timeout = Duration::from_secs(timeout_secs);
        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutcome {
                    success: output.status.success(),
                    output: text,
                }
            }
            Ok(Err(error)) => {
                warn!(command = command_line, %error, "validation command failed to spawn");
                CommandOutcome {
                    success: false,
                    output: format!("failed to spawn: {error}"),
                }
            }
            Err(_) => {
                warn!(command = command_line, timeout_secs, "validation command timed out");
                CommandOutcome {
                    success: false,
                    output: format!("timed out after {timeout_secs}s"),
                }
            }
        }
    }
}

#[async_trait]
impl ValidationRunner for CommandValidationRunner {
    #[instrument(skip(self))]
    async fn run_tests(&self) -> TestReport {
        let Some(command) = &self.config.test_command else {
            debug!("no test command configured, passing");
            return TestReport {
                passed: true,
                output: "no test command configured".to_string(),
                coverage: None,
            };
        };
        let outcome = self
            .run_command(command, self.config.test_timeout_secs)
            .await;
        TestReport {
            passed: outcome.success,
            coverage: extract_coverage(&outcome.output),
            output: outcome.output,
        }
    }

    #[instrument(skip(self))]
    async fn run_linter(&self) -> LintReport {
        let Some(command) = &self.config.lint_command else {
            debug!("no lint command configured, passing");
            return LintReport {
                passed: true,
                output: "no lint command configured".to_string(),
                errors: vec![],
            };
        };
        let outcome = self
            .run_command(command, self.config.lint_timeout_secs)
            .await;
        LintReport {
            passed: outcome.success,
            errors: collect_error_lines(&outcome.output),
            output: outcome.output,
        }
    }

    #[instrument(skip(self))]
    async fn run_build(&self) -> BuildReport {
        let Some(command) = &self.config.build_command else {
            debug!("no build command configured, passing");
            return BuildReport {
                succeeded: true,
                output: "no build command configured".to_string(),
                artifacts: vec![],
            };
        };
        let outcome = self
            .run_command(command, self.config.build_timeout_secs)
            .await;
        BuildReport {
            succeeded: outcome.success,
            output: outcome.output,
            artifacts: vec![],
        }
    }
}

/// Pull a "coverage: NN%" figure out of test output, if present.
fn extract_coverage(output: &str) -> Option<f64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let regex = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)coverage[^0-9%]*([0-9]+(?:\.[0-9]+)?)\s*%").expect("static coverage pattern")
    });
    regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Lines that look like individual errors, for the repeated-error
/// fingerprint.
fn collect_error_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") || lower.contains("warning:")
        })
        .map(|line| line.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(config: ValidationConfig) -> CommandValidationRunner {
        CommandValidationRunner::new(config)
    }

    #[tokio::test]
    async fn test_unconfigured_gates_pass() {
        let r = runner(ValidationConfig::default());
        assert!(r.run_tests().await.passed);
        assert!(r.run_linter().await.passed);
        assert!(r.run_build().await.succeeded);
    }

    #[tokio::test]
    async fn test_exit_status_drives_pass_fail() {
        let r = runner(ValidationConfig {
            test_command: Some("true".to_string()),
            lint_command: Some("false".to_string()),
            ..Default::default()
        });
        assert!(r.run_tests().await.passed);
        assert!(!r.run_linter().await.passed);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_failed_report() {
        let r = runner(ValidationConfig {
            build_command: Some("definitely-not-a-real-binary-1d8a".to_string()),
            ..Default::default()
        });
        let report = r.run_build().await;
        assert!(!report.succeeded);
        assert!(report.output.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_timeout_fails_the_gate() {
        let r = runner(ValidationConfig {
            test_command: Some("sleep 10".to_string()),
            test_timeout_secs: 1,
            ..Default::default()
        });
        let report = r.run_tests().await;
        assert!(!report.passed);
        assert!(report.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_coverage_extracted_from_output() {
        let r = runner(ValidationConfig {
            test_command: Some("echo coverage: 87.5% of lines".to_string()),
            ..Default::default()
        });
        let report = r.run_tests().await;
        assert!(report.passed);
        assert_eq!(report.coverage, Some(87.5));
    }

    #[test]
    fn test_extract_coverage_variants() {
        assert_eq!(extract_coverage("Total coverage: 92%"), Some(92.0));
        assert_eq!(extract_coverage("Coverage   81.25 %"), Some(81.25));
        assert_eq!(extract_coverage("no figures here"), None);
    }

    #[test]
    fn test_collect_error_lines() {
        let output = "checking...\nerror[E0308]: mismatched types\nok\nwarning: unused import\n";
        let errors = collect_error_lines(output);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("E0308"));
    }
}
