//! Completion criteria and evaluation.
//!
//! A task is complete only when every configured gate passes at once:
//! enough changed files, enough completion-indicator phrases in the worker
//! output, an explicit exit marker when required, and any demanded
//! validation gates. Presets are selected per task type, inferred from
//! tags first and description keywords second.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::models::{IterationRecord, Task};

/// Phrases worth two indicator points. Scanned as whole words.
const STRONG_PHRASES: &[&str] = &[
    "project complete",
    "all done",
    "task complete",
    "implementation complete",
];

/// Phrases worth one indicator point each.
const MEDIUM_PHRASES: &[&str] = &["done", "ready", "complete", "completed", "finished"];

/// Coarse task classification used to pick a gate preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeImplementation,
    Documentation,
    Research,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeImplementation => "code_implementation",
            Self::Documentation => "documentation",
            Self::Research => "research",
            Self::General => "general",
        }
    }

    /// Tags win over description keywords; the first matching class wins.
    pub fn infer(task: &Task) -> Self {
        const CODE_TAGS: &[&str] = &["code", "implementation", "feature", "bug", "bugfix", "refactor"];
        const DOC_TAGS: &[&str] = &["docs", "documentation"];
        const RESEARCH_TAGS: &[&str] = &["research", "investigation", "analysis"];

        if task.tags.iter().any(|t| CODE_TAGS.contains(&t.as_str())) {
            return Self::CodeImplementation;
        }
        if task.tags.iter().any(|t| DOC_TAGS.contains(&t.as_str())) {
            return Self::Documentation;
        }
        if task.tags.iter().any(|t| RESEARCH_TAGS.contains(&t.as_str())) {
            return Self::Research;
        }

        let description = task.description.to_lowercase();
        const CODE_WORDS: &[&str] = &["implement", "fix", "refactor", "debug", "compile"];
        const DOC_WORDS: &[&str] = &["document", "readme", "changelog", "write up"];
        const RESEARCH_WORDS: &[&str] = &["research", "investigate", "analyze", "explore", "compare"];

        if CODE_WORDS.iter().any(|w| description.contains(w)) {
            Self::CodeImplementation
        } else if DOC_WORDS.iter().any(|w| description.contains(w)) {
            Self::Documentation
        } else if RESEARCH_WORDS.iter().any(|w| description.contains(w)) {
            Self::Research
        } else {
            Self::General
        }
    }
}

/// Gate set a task must clear before the executor declares it complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionCriteria {
    pub task_type: TaskType,
    pub require_tests_pass: bool,
    pub require_lint_pass: bool,
    pub require_build_pass: bool,
    pub require_exit_signal: bool,
    pub min_completion_indicators: u32,
    pub min_file_changes: usize,
}

impl CompletionCriteria {
    /// Preset for the inferred type of `task`.
    pub fn for_task(task: &Task) -> Self {
        match TaskType::infer(task) {
            TaskType::CodeImplementation => Self::code_implementation(),
            TaskType::Documentation => Self::documentation(),
            TaskType::Research => Self::research(),
            TaskType::General => Self::general(),
        }
    }

    pub fn code_implementation() -> Self {
        Self {
            task_type: TaskType::CodeImplementation,
            require_tests_pass: true,
            require_lint_pass: true,
            require_build_pass: true,
            require_exit_signal: true,
            min_completion_indicators: 2,
            min_file_changes: 1,
        }
    }

    pub fn documentation() -> Self {
        Self {
            task_type: TaskType::Documentation,
            require_tests_pass: false,
            require_lint_pass: true,
            require_build_pass: false,
            require_exit_signal: true,
            min_completion_indicators: 1,
            min_file_changes: 1,
        }
    }

    pub fn research() -> Self {
        Self {
            task_type: TaskType::Research,
            require_tests_pass: false,
            require_lint_pass: false,
            require_build_pass: false,
            require_exit_signal: true,
            min_completion_indicators: 2,
            min_file_changes: 0,
        }
    }

    pub fn general() -> Self {
        Self {
            task_type: TaskType::General,
            require_tests_pass: false,
            require_lint_pass: false,
            require_build_pass: false,
            require_exit_signal: true,
            min_completion_indicators: 2,
            min_file_changes: 0,
        }
    }

    /// Whether any validation gate is demanded at all.
    pub fn needs_validation(&self) -> bool {
        self.require_tests_pass || self.require_lint_pass || self.require_build_pass
    }

    /// Evaluate every gate against one iteration. All gates must pass.
    pub fn evaluate(&self, record: &IterationRecord) -> CompletionEvaluation {
        let mut unmet = Vec::new();

        if record.changed_files.len() < self.min_file_changes {
            unmet.push(format!(
                "changed files {} below minimum {}",
                record.changed_files.len(),
                self.min_file_changes
            ));
        }

        let indicator_score = indicator_score(&record.worker_output);
        if indicator_score < self.min_completion_indicators {
            unmet.push(format!(
                "completion indicators {indicator_score} below minimum {}",
                self.min_completion_indicators
            ));
        }

        if self.require_exit_signal && !has_exit_signal(&record.worker_output) {
            unmet.push("exit signal missing".to_string());
        }

        let validation = record.validation.as_ref();
        let gates = [
            (self.require_tests_pass, validation.and_then(|v| v.tests_passed), "tests"),
            (self.require_lint_pass, validation.and_then(|v| v.linter_passed), "linter"),
            (
                self.require_build_pass,
                validation.and_then(|v| v.build_succeeded),
                "build",
            ),
        ];
        for (required, outcome, name) in gates {
            // A gate that never ran is an automatic pass; only an observed
            // failure blocks completion.
            if required && outcome == Some(false) {
                unmet.push(format!("{name} gate failed"));
            }
        }

        CompletionEvaluation {
            satisfied: unmet.is_empty(),
            indicator_score,
            unmet,
        }
    }
}

/// Outcome of one completion check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvaluation {
    pub satisfied: bool,
    pub indicator_score: u32,
    pub unmet: Vec<String>,
}

/// Whole-word indicator scan. Strong and medium phrases are counted
/// independently, so "all done" contributes both the strong phrase and the
/// standalone "done".
fn indicator_score(output: &str) -> u32 {
    let patterns = indicator_patterns();
    patterns
        .iter()
        .filter(|(regex, _)| regex.is_match(output))
        .map(|(_, points)| points)
        .sum()
}

fn has_exit_signal(output: &str) -> bool {
    exit_signal_pattern().is_match(output)
}

fn indicator_patterns() -> &'static [(Regex, u32)] {
    static PATTERNS: OnceLock<Vec<(Regex, u32)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |phrase: &str, points: u32| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(phrase));
            // Patterns are static literals; compilation cannot fail.
            (Regex::new(&pattern).expect("static indicator pattern"), points)
        };
        STRONG_PHRASES
            .iter()
            .map(|p| compile(p, 2))
            .chain(MEDIUM_PHRASES.iter().map(|p| compile(p, 1)))
            .collect()
    })
}

fn exit_signal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bEXIT_SIGNAL\s*:\s*true\b").expect("static exit pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_output(output: &str, changed: &[&str]) -> IterationRecord {
        IterationRecord::new(
            1,
            changed.iter().map(|s| s.to_string()).collect(),
            None,
            output,
            vec![],
        )
    }

    #[test]
    fn test_infer_from_tags_beats_description() {
        let task = Task::new("t", "research the flaky login").with_tag("bugfix");
        assert_eq!(TaskType::infer(&task), TaskType::CodeImplementation);
    }

    #[test]
    fn test_infer_from_description() {
        assert_eq!(
            TaskType::infer(&Task::new("t", "Implement retry logic in the client")),
            TaskType::CodeImplementation
        );
        assert_eq!(
            TaskType::infer(&Task::new("t", "Update the README with setup steps")),
            TaskType::Documentation
        );
        assert_eq!(
            TaskType::infer(&Task::new("t", "Investigate why deploys stall")),
            TaskType::Research
        );
        assert_eq!(
            TaskType::infer(&Task::new("t", "Rotate the quarterly schedule")),
            TaskType::General
        );
    }

    #[test]
    fn test_indicator_scoring_counts_overlaps() {
        // "all done" scores 2, standalone "done" scores 1 more.
        assert_eq!(indicator_score("All done."), 3);
        assert_eq!(indicator_score("done"), 1);
        assert_eq!(indicator_score("nothing to report"), 0);
    }

    #[test]
    fn test_whole_word_matching() {
        // "completed" must not satisfy the "complete" phrase.
        assert_eq!(indicator_score("completed"), 1);
        assert_eq!(indicator_score("task completeness review"), 0);
        assert_eq!(indicator_score("readying the branch"), 0);
    }

    #[test]
    fn test_exit_signal_variants() {
        assert!(has_exit_signal("EXIT_SIGNAL: true"));
        assert!(has_exit_signal("exit_signal:true"));
        assert!(has_exit_signal("Work finished. EXIT_SIGNAL : true"));
        assert!(!has_exit_signal("EXIT_SIGNAL: false"));
        assert!(!has_exit_signal("no signal here"));
    }

    #[test]
    fn test_acceptance_output_satisfies_default_criteria() {
        let record =
            record_with_output("Task completed. EXIT_SIGNAL: true. All done.", &["src/lib.rs"]);
        let evaluation = CompletionCriteria::general().evaluate(&record);
        assert!(evaluation.satisfied, "unmet: {:?}", evaluation.unmet);
        assert_eq!(evaluation.indicator_score, 4);
    }

    #[test]
    fn test_missing_exit_signal_blocks() {
        let record = record_with_output("Task completed. All done.", &["src/lib.rs"]);
        let evaluation = CompletionCriteria::general().evaluate(&record);
        assert!(!evaluation.satisfied);
        assert!(evaluation.unmet.iter().any(|u| u.contains("exit signal")));
    }

    #[test]
    fn test_code_preset_requires_changed_files() {
        let record = record_with_output("All done. EXIT_SIGNAL: true", &[]);
        let evaluation = CompletionCriteria::code_implementation().evaluate(&record);
        assert!(!evaluation.satisfied);
        assert!(evaluation.unmet.iter().any(|u| u.contains("changed files")));
    }

    #[test]
    fn test_failed_gate_blocks_code_preset() {
        let mut record = record_with_output("All done. EXIT_SIGNAL: true", &["src/a.rs"]);
        record.validation = Some(crate::domain::models::ValidationOutcome {
            tests_passed: Some(false),
            linter_passed: Some(true),
            build_succeeded: Some(true),
        });
        let evaluation = CompletionCriteria::code_implementation().evaluate(&record);
        assert!(!evaluation.satisfied);
        assert!(evaluation.unmet.iter().any(|u| u.contains("tests")));
    }

    #[test]
    fn test_unran_gate_is_automatic_pass() {
        let record = record_with_output("All done. EXIT_SIGNAL: true", &["src/a.rs"]);
        let evaluation = CompletionCriteria::code_implementation().evaluate(&record);
        assert!(evaluation.satisfied, "unmet: {:?}", evaluation.unmet);
    }

    #[test]
    fn test_indicator_threshold() {
        // "ready" alone scores 1, short of the default minimum of 2.
        let record = record_with_output("ready. EXIT_SIGNAL: true", &[]);
        let evaluation = CompletionCriteria::general().evaluate(&record);
        assert!(!evaluation.satisfied);

        let record = record_with_output("done and ready. EXIT_SIGNAL: true", &[]);
        let evaluation = CompletionCriteria::general().evaluate(&record);
        assert!(evaluation.satisfied);
    }

    #[test]
    fn test_needs_validation() {
        assert!(CompletionCriteria::code_implementation().needs_validation());
        assert!(CompletionCriteria::documentation().needs_validation());
        assert!(!CompletionCriteria::research().needs_validation());
        assert!(!CompletionCriteria::general().needs_validation());
    }

    #[test]
    fn test_preset_selection() {
        let code = Task::new("t", "d").with_tag("feature");
        assert_eq!(
            CompletionCriteria::for_task(&code).task_type,
            TaskType::CodeImplementation
        );
        let docs = Task::new("t", "d").with_tag("docs");
        assert_eq!(
            CompletionCriteria::for_task(&docs).task_type,
            TaskType::Documentation
        );
    }
}
