//! Per-task circuit breaker over iteration outcomes.
//!
//! Standard three-state machine. A closed circuit trips open when recent
//! iterations show no progress, when the same errors keep coming back, or
//! when the progress tracker declares the task stuck. An open circuit
//! blocks execution until a cooldown elapses, then admits a single probe
//! iteration in half-open; the probe's outcome decides between closing
//! and reopening.
//!
//! The breaker keeps its own bounded copy of recent iteration records so
//! trip decisions need no lock on the progress tracker.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{CircuitBreakerConfig, IterationRecord};

/// State of one task's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// One task's circuit. Fields are public so tests can rewind timestamps.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub state: CircuitState,
    pub history: VecDeque<IterationRecord>,
    pub opened_at: Option<DateTime<Utc>>,
    pub state_changed_at: DateTime<Utc>,
    pub open_count: u32,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            history: VecDeque::new(),
            opened_at: None,
            state_changed_at: Utc::now(),
            open_count: 0,
        }
    }

    fn push_record(&mut self, record: IterationRecord, cap: usize) {
        if self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Utc::now());
        self.state_changed_at = Utc::now();
        self.open_count += 1;
    }

    fn half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.state_changed_at = Utc::now();
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.state_changed_at = Utc::now();
    }

    /// First trip rule that currently fires, if any.
    fn trip_reason(&self, config: &CircuitBreakerConfig, tracker_stuck: bool) -> Option<String> {
        if self.no_progress_in_last(config.no_progress_threshold) {
            return Some(format!(
                "no progress in last {} iterations",
                config.no_progress_threshold
            ));
        }
        if self.same_errors_in_last(config.repeated_error_threshold) {
            return Some(format!(
                "same errors repeated across {} iterations",
                config.repeated_error_threshold
            ));
        }
        if tracker_stuck {
            return Some("progress tracker reports task stuck".to_string());
        }
        None
    }

    /// True when the last `n` records all lack progress.
    fn no_progress_in_last(&self, n: u32) -> bool {
        let n = n as usize;
        self.history.len() >= n && self.history.iter().rev().take(n).all(|r| !r.has_progress)
    }

    /// True when the last `n` records carry the same non-empty error set.
    fn same_errors_in_last(&self, n: u32) -> bool {
        let n = n as usize;
        if self.history.len() < n {
            return false;
        }
        let mut tail = self.history.iter().rev().take(n);
        let Some(first) = tail.next().map(IterationRecord::error_set) else {
            return false;
        };
        if first.is_empty() {
            return false;
        }
        tail.all(|r| r.error_set() == first)
    }
}

/// Verdict from a single gate check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerResult {
    pub should_continue: bool,
    pub reason: String,
    pub state: CircuitState,
    pub iteration: u32,
}

/// Observability snapshot of one circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStats {
    pub task_id: Uuid,
    pub state: CircuitState,
    pub history_len: usize,
    pub open_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Keyed circuit-breaker service, one independent circuit per task.
#[derive(Debug, Clone)]
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    breakers: Arc<RwLock<HashMap<Uuid, CircuitBreaker>>>,
}

impl CircuitBreakerService {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Gate an iteration. Folds the latest finished record into the
    /// circuit's history, then applies the state machine.
    #[instrument(skip(self, latest), fields(task_id = %task_id, iteration))]
    pub async fn check_should_continue(
        &self,
        task_id: Uuid,
        iteration: u32,
        latest: Option<&IterationRecord>,
        tracker_stuck: bool,
    ) -> CircuitBreakerResult {
        if !self.config.enabled {
            return CircuitBreakerResult {
                should_continue: true,
                reason: "circuit breaker disabled".to_string(),
                state: CircuitState::Closed,
                iteration,
            };
        }

        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(task_id).or_insert_with(CircuitBreaker::new);
        if let Some(record) = latest {
            breaker.push_record(record.clone(), self.config.history_limit);
        }

        match breaker.state {
            CircuitState::Closed => {
                match breaker.trip_reason(&self.config, tracker_stuck) {
                    Some(reason) => {
                        breaker.open();
                        warn!(%task_id, %reason, "circuit opened");
                        CircuitBreakerResult {
                            should_continue: false,
                            reason,
                            state: CircuitState::Open,
                            iteration,
                        }
                    }
                    None => CircuitBreakerResult {
                        should_continue: true,
                        reason: "circuit closed".to_string(),
                        state: CircuitState::Closed,
                        iteration,
                    },
                }
            }
            CircuitState::Open => {
                let elapsed = breaker
                    .opened_at
                    .map(|at| Utc::now() - at)
                    .unwrap_or_else(chrono::Duration::zero);
                if elapsed >= self.config.open_timeout() {
                    breaker.half_open();
                    info!(%task_id, "circuit half-open, admitting probe iteration");
                    CircuitBreakerResult {
                        should_continue: true,
                        reason: "cooldown elapsed, probing with one iteration".to_string(),
                        state: CircuitState::HalfOpen,
                        iteration,
                    }
                } else {
                    let remaining =
                        (self.config.open_timeout() - elapsed).num_seconds().max(0);
                    CircuitBreakerResult {
                        should_continue: false,
                        reason: format!("circuit open, retry in {remaining}s"),
                        state: CircuitState::Open,
                        iteration,
                    }
                }
            }
            CircuitState::HalfOpen => {
                let Some(probe) = latest else {
                    // No probe outcome yet; keep probation open.
                    return CircuitBreakerResult {
                        should_continue: true,
                        reason: "awaiting probe outcome".to_string(),
                        state: CircuitState::HalfOpen,
                        iteration,
                    };
                };
                let tripped = breaker.trip_reason(&self.config, tracker_stuck);
                if probe.has_progress && tripped.is_none() {
                    breaker.close();
                    info!(%task_id, "probe made progress, circuit closed");
                    CircuitBreakerResult {
                        should_continue: true,
                        reason: "probe made progress, circuit closed".to_string(),
                        state: CircuitState::Closed,
                        iteration,
                    }
                } else {
                    let reason = tripped
                        .unwrap_or_else(|| "probe made no progress, circuit reopened".to_string());
                    breaker.open();
                    warn!(%task_id, %reason, "circuit reopened");
                    CircuitBreakerResult {
                        should_continue: false,
                        reason,
                        state: CircuitState::Open,
                        iteration,
                    }
                }
            }
        }
    }

    /// Current state of a task's circuit, if one exists.
    pub async fn state(&self, task_id: Uuid) -> Option<CircuitState> {
        self.breakers.read().await.get(&task_id).map(|b| b.state)
    }

    /// Stats snapshot for a task's circuit, if one exists.
    pub async fn stats(&self, task_id: Uuid) -> Option<CircuitStats> {
        self.breakers.read().await.get(&task_id).map(|b| CircuitStats {
            task_id,
            state: b.state,
            history_len: b.history.len(),
            open_count: b.open_count,
            opened_at: b.opened_at,
        })
    }

    /// Drop a task's circuit entirely.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn reset(&self, task_id: Uuid) {
        if self.breakers.write().await.remove(&task_id).is_some() {
            info!(%task_id, "circuit reset");
        }
    }

    /// Drop every circuit.
    pub async fn reset_all(&self) {
        self.breakers.write().await.clear();
    }

    /// Test and diagnostic hook: mutate a single circuit in place.
    #[cfg(test)]
    async fn with_breaker<F: FnOnce(&mut CircuitBreaker)>(&self, task_id: Uuid, f: F) {
        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get_mut(&task_id) {
            f(breaker);
        }
    }
}
