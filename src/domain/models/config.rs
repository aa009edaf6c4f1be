//! Configuration tree for the pitboss control loop.
//!
//! Every numeric that drives a decision (thresholds, windows, caps) lives
//! here as a default rather than as a constant buried in a service.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory for persisted per-task state (progress and session files)
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Autonomy level assignment
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Threshold-nudging heuristic
    #[serde(default)]
    pub learning: LearningConfig,

    /// Per-task circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Progress tracking
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Session lifecycle
    #[serde(default)]
    pub session: SessionConfig,

    /// Control loop bounds
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Validation collaborator commands
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> String {
    ".pitboss/state".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            autonomy: AutonomyConfig::default(),
            learning: LearningConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            progress: ProgressConfig::default(),
            session: SessionConfig::default(),
            executor: ExecutorConfig::default(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Check cross-field invariants. Called by the loader after merging.
    pub fn validate(&self) -> Result<(), String> {
        if self.executor.max_iterations == 0 {
            return Err("executor.max_iterations must be at least 1".to_string());
        }
        if self.session.expiration_hours <= 0 {
            return Err("session.expiration_hours must be positive".to_string());
        }
        if self.learning.step <= 0.0 {
            return Err("learning.step must be positive".to_string());
        }
        self.learning.validate()?;
        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_lowercase().as_str())
        {
            return Err(format!("unknown logging.level: {}", self.logging.level));
        }
        if !["pretty", "json"].contains(&self.logging.format.as_str()) {
            return Err(format!("unknown logging.format: {}", self.logging.format));
        }
        for (name, timeout) in [
            ("test", self.validation.test_timeout_secs),
            ("lint", self.validation.lint_timeout_secs),
            ("build", self.validation.build_timeout_secs),
        ] {
            if timeout == 0 {
                return Err(format!("validation.{name}_timeout_secs must be positive"));
            }
        }
        Ok(())
    }
}

/// Autonomy level assignment bounds.
///
/// The level-3/level-4 confidence thresholds are owned by the learning
/// engine (they move over time); the risk caps and the level-2 floor stay
/// fixed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutonomyConfig {
    /// Minimum confidence for level 2
    #[serde(default = "default_level2_min_confidence")]
    pub level2_min_confidence: f64,

    /// Maximum risk for level 2
    #[serde(default = "default_level2_max_risk")]
    pub level2_max_risk: f64,

    /// Maximum risk for level 3
    #[serde(default = "default_level3_max_risk")]
    pub level3_max_risk: f64,

    /// Maximum risk for level 4
    #[serde(default = "default_level4_max_risk")]
    pub level4_max_risk: f64,

    /// Static reliability table keyed by worker role
    #[serde(default = "default_role_reliability")]
    pub role_reliability: HashMap<String, f64>,

    /// Reliability assumed for roles missing from the table
    #[serde(default = "default_unknown_role_reliability")]
    pub unknown_role_reliability: f64,

    /// Maximum retained decision-history entries
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

const fn default_level2_min_confidence() -> f64 {
    0.60
}

const fn default_level2_max_risk() -> f64 {
    0.60
}

const fn default_level3_max_risk() -> f64 {
    0.40
}

const fn default_level4_max_risk() -> f64 {
    0.20
}

fn default_role_reliability() -> HashMap<String, f64> {
    [
        ("engineer", 0.9),
        ("reviewer", 0.85),
        ("analyst", 0.8),
        ("writer", 0.75),
        ("generalist", 0.7),
    ]
    .into_iter()
    .map(|(role, reliability)| (role.to_string(), reliability))
    .collect()
}

const fn default_unknown_role_reliability() -> f64 {
    0.7
}

const fn default_history_limit() -> usize {
    1000
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level2_min_confidence: default_level2_min_confidence(),
            level2_max_risk: default_level2_max_risk(),
            level3_max_risk: default_level3_max_risk(),
            level4_max_risk: default_level4_max_risk(),
            role_reliability: default_role_reliability(),
            unknown_role_reliability: default_unknown_role_reliability(),
            history_limit: default_history_limit(),
        }
    }
}

/// Fixed-step threshold nudging over a rolling outcome window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearningConfig {
    /// Rolling window of recent outcomes
    #[serde(default = "default_window")]
    pub window: usize,

    /// Adjustment step applied to both thresholds
    #[serde(default = "default_step")]
    pub step: f64,

    /// Starting confidence threshold for level 3
    #[serde(default = "default_initial_level3")]
    pub initial_level3_threshold: f64,

    /// Starting confidence threshold for level 4
    #[serde(default = "default_initial_level4")]
    pub initial_level4_threshold: f64,

    /// Lower bound for the level-3 threshold
    #[serde(default = "default_level3_floor")]
    pub level3_floor: f64,

    /// Upper bound for the level-3 threshold
    #[serde(default = "default_level3_ceiling")]
    pub level3_ceiling: f64,

    /// Lower bound for the level-4 threshold
    #[serde(default = "default_level4_floor")]
    pub level4_floor: f64,

    /// Upper bound for the level-4 threshold
    #[serde(default = "default_level4_ceiling")]
    pub level4_ceiling: f64,

    /// Success rate above which thresholds relax
    #[serde(default = "default_relax_above")]
    pub relax_above: f64,

    /// Success rate below which thresholds tighten
    #[serde(default = "default_tighten_below")]
    pub tighten_below: f64,
}

const fn default_window() -> usize {
    20
}

const fn default_step() -> f64 {
    0.05
}

const fn default_initial_level3() -> f64 {
    0.80
}

const fn default_initial_level4() -> f64 {
    0.90
}

const fn default_level3_floor() -> f64 {
    0.75
}

const fn default_level3_ceiling() -> f64 {
    0.90
}

const fn default_level4_floor() -> f64 {
    0.85
}

const fn default_level4_ceiling() -> f64 {
    0.95
}

const fn default_relax_above() -> f64 {
    0.90
}

const fn default_tighten_below() -> f64 {
    0.70
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            step: default_step(),
            initial_level3_threshold: default_initial_level3(),
            initial_level4_threshold: default_initial_level4(),
            level3_floor: default_level3_floor(),
            level3_ceiling: default_level3_ceiling(),
            level4_floor: default_level4_floor(),
            level4_ceiling: default_level4_ceiling(),
            relax_above: default_relax_above(),
            tighten_below: default_tighten_below(),
        }
    }
}

impl LearningConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.window == 0 {
            return Err("learning.window must be at least 1".to_string());
        }
        for (name, floor, initial, ceiling) in [
            (
                "level3",
                self.level3_floor,
                self.initial_level3_threshold,
                self.level3_ceiling,
            ),
            (
                "level4",
                self.level4_floor,
                self.initial_level4_threshold,
                self.level4_ceiling,
            ),
        ] {
            if !(floor <= initial && initial <= ceiling) {
                return Err(format!(
                    "learning.{name} thresholds must satisfy floor <= initial <= ceiling"
                ));
            }
        }
        Ok(())
    }
}

/// Circuit breaker trip rules and recovery window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Open after this many consecutive no-progress iterations
    #[serde(default = "default_no_progress_threshold")]
    pub no_progress_threshold: u32,

    /// Open when the same non-empty error set repeats this many times
    #[serde(default = "default_repeated_error_threshold")]
    pub repeated_error_threshold: u32,

    /// Seconds to keep the circuit open before probing recovery
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: i64,

    /// Iteration records retained per circuit
    #[serde(default = "default_breaker_history_limit")]
    pub history_limit: usize,

    /// Whether the breaker gates the loop at all
    #[serde(default = "default_breaker_enabled")]
    pub enabled: bool,
}

const fn default_no_progress_threshold() -> u32 {
    3
}

const fn default_repeated_error_threshold() -> u32 {
    5
}

const fn default_open_timeout_secs() -> i64 {
    60
}

const fn default_breaker_history_limit() -> usize {
    20
}

const fn default_breaker_enabled() -> bool {
    true
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            no_progress_threshold: default_no_progress_threshold(),
            repeated_error_threshold: default_repeated_error_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            history_limit: default_breaker_history_limit(),
            enabled: default_breaker_enabled(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Trip earlier on both rules.
    pub fn strict() -> Self {
        Self {
            no_progress_threshold: 2,
            repeated_error_threshold: 3,
            ..Default::default()
        }
    }

    /// Gate everything open, for callers that manage retries themselves.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::seconds(self.open_timeout_secs)
    }
}

/// Progress tracker retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProgressConfig {
    /// Iteration records retained per task
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

const fn default_max_records() -> usize {
    100
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

/// Session lifecycle bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Hours of inactivity before a session is recreated
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: i64,

    /// Iteration summaries retained per session
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,
}

const fn default_expiration_hours() -> i64 {
    24
}

const fn default_max_summaries() -> usize {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_hours: default_expiration_hours(),
            max_summaries: default_max_summaries(),
        }
    }
}

impl SessionConfig {
    pub fn expiration(&self) -> Duration {
        Duration::hours(self.expiration_hours)
    }
}

/// Control loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Iteration budget per execution
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Sleep between iterations, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Timeout for one worker invocation, in seconds
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
}

const fn default_max_iterations() -> u32 {
    50
}

const fn default_debounce_ms() -> u64 {
    100
}

const fn default_worker_timeout_secs() -> u64 {
    300
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            debounce_ms: default_debounce_ms(),
            worker_timeout_secs: default_worker_timeout_secs(),
        }
    }
}

/// Validation collaborator commands and timeouts.
///
/// A `None` command means the gate is not configured and passes
/// automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Test command, e.g. "cargo test"
    #[serde(default)]
    pub test_command: Option<String>,

    /// Linter command, e.g. "cargo clippy"
    #[serde(default)]
    pub lint_command: Option<String>,

    /// Build command, e.g. "cargo build"
    #[serde(default)]
    pub build_command: Option<String>,

    /// Test timeout in seconds
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,

    /// Linter timeout in seconds
    #[serde(default = "default_lint_timeout_secs")]
    pub lint_timeout_secs: u64,

    /// Build timeout in seconds
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    /// Directory commands run in; defaults to the process working directory
    #[serde(default)]
    pub working_dir: Option<String>,
}

const fn default_test_timeout_secs() -> u64 {
    300
}

const fn default_lint_timeout_secs() -> u64 {
    60
}

const fn default_build_timeout_secs() -> u64 {
    600
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            test_command: None,
            lint_command: None,
            build_command: None,
            test_timeout_secs: default_test_timeout_secs(),
            lint_timeout_secs: default_lint_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            working_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stdout format: pretty or json
    #[serde(default = "default_log_format")]
    pub format: String,

    /// When set, JSON logs are also written to rolling files here
    #[serde(default)]
    pub directory: Option<String>,

    /// File rotation: daily, hourly, or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
            rotation: default_log_rotation(),
        }
    }
}
