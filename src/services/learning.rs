//! Adaptive autonomy thresholds.
//!
//! Tracks a sliding window of outcomes and nudges the level-3 and level-4
//! confidence gates after every record: relax when the recent success rate
//! is high, tighten when it is low. Each threshold stays inside its
//! configured floor/ceiling band, so a pathological streak cannot push the
//! gates somewhere unrecoverable.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::LearningConfig;

/// Current confidence gates for the upper autonomy levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnedThresholds {
    pub level3: f64,
    pub level4: f64,
}

#[derive(Debug)]
struct LearningState {
    outcomes: VecDeque<bool>,
    level3_threshold: f64,
    level4_threshold: f64,
}

/// Sliding-window learner over decision outcomes.
#[derive(Debug)]
pub struct LearningEngine {
    config: LearningConfig,
    state: RwLock<LearningState>,
}

impl LearningEngine {
    pub fn new(config: LearningConfig) -> Self {
        let state = LearningState {
            outcomes: VecDeque::new(),
            level3_threshold: config.initial_level3_threshold,
            level4_threshold: config.initial_level4_threshold,
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// Record one outcome and re-evaluate the thresholds.
    pub async fn record_outcome(&self, success: bool) {
        let mut state = self.state.write().await;
        if state.outcomes.len() >= self.config.window {
            state.outcomes.pop_front();
        }
        state.outcomes.push_back(success);

        let successes = state.outcomes.iter().filter(|s| **s).count();
        let rate = successes as f64 / state.outcomes.len() as f64;

        if rate > self.config.relax_above {
            state.level3_threshold =
                (state.level3_threshold - self.config.step).max(self.config.level3_floor);
            state.level4_threshold =
                (state.level4_threshold - self.config.step).max(self.config.level4_floor);
            debug!(
                rate,
                level3 = state.level3_threshold,
                level4 = state.level4_threshold,
                "relaxed autonomy thresholds"
            );
        } else if rate < self.config.tighten_below {
            state.level3_threshold =
                (state.level3_threshold + self.config.step).min(self.config.level3_ceiling);
            state.level4_threshold =
                (state.level4_threshold + self.config.step).min(self.config.level4_ceiling);
            debug!(
                rate,
                level3 = state.level3_threshold,
                level4 = state.level4_threshold,
                "tightened autonomy thresholds"
            );
        }
    }

    /// Snapshot of the current gates.
    pub async fn thresholds(&self) -> LearnedThresholds {
        let state = self.state.read().await;
        LearnedThresholds {
            level3: state.level3_threshold,
            level4: state.level4_threshold,
        }
    }

    /// Success rate over the current window, if any outcomes exist.
    pub async fn window_success_rate(&self) -> Option<f64> {
        let state = self.state.read().await;
        if state.outcomes.is_empty() {
            return None;
        }
        let successes = state.outcomes.iter().filter(|s| **s).count();
        Some(successes as f64 / state.outcomes.len() as f64)
    }
}
