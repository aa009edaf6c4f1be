//! Confidence calculator.
//!
//! Pure weighted-sum scoring over six factors. Weights sum to 1.0, so the
//! result lands in [0, 1] whenever every factor does; the final clamp is
//! belt-and-braces against drifted factor values.

use std::collections::{BTreeMap, HashMap};

use crate::domain::models::{Complexity, ConfidenceScore, Situation, SituationAnalysis};
use crate::services::history::DecisionRecord;

const WEIGHT_HISTORICAL_SUCCESS: f64 = 0.30;
const WEIGHT_ROLE_RELIABILITY: f64 = 0.25;
const WEIGHT_COMPLEXITY_FIT: f64 = 0.15;
const WEIGHT_DESCRIPTION_CLARITY: f64 = 0.10;
const WEIGHT_RESOURCE_AVAILABILITY: f64 = 0.10;
const WEIGHT_CONTEXT_RICHNESS: f64 = 0.10;

/// Neutral prior when no similar decisions exist yet.
const NO_HISTORY_SUCCESS: f64 = 0.5;

/// Computes a [`ConfidenceScore`] for a situation. No side effects.
#[derive(Debug, Clone)]
pub struct ConfidenceCalculator {
    role_reliability: HashMap<String, f64>,
    unknown_role_reliability: f64,
}

impl ConfidenceCalculator {
    pub fn new(role_reliability: HashMap<String, f64>, unknown_role_reliability: f64) -> Self {
        Self {
            role_reliability,
            unknown_role_reliability,
        }
    }

    /// Reliability of a single role per the static table.
    pub fn role_reliability(&self, role: &str) -> f64 {
        self.role_reliability
            .get(&role.to_lowercase())
            .copied()
            .unwrap_or(self.unknown_role_reliability)
    }

    /// The most reliable of the available roles, falling back to
    /// "generalist" when none are offered.
    pub fn best_role(&self, available_roles: &[String]) -> String {
        available_roles
            .iter()
            .max_by(|a, b| {
                self.role_reliability(a)
                    .total_cmp(&self.role_reliability(b))
            })
            .cloned()
            .unwrap_or_else(|| "generalist".to_string())
    }

    /// Score a situation against its analysis and similar past decisions.
    pub fn calculate(
        &self,
        situation: &Situation,
        analysis: &SituationAnalysis,
        similar: &[DecisionRecord],
    ) -> ConfidenceScore {
        let mut factors = BTreeMap::new();

        let historical = match similar.len() {
            0 => NO_HISTORY_SUCCESS,
            total => {
                let successes = similar.iter().filter(|r| r.success).count();
                successes as f64 / total as f64
            }
        };
        factors.insert("historical_success".to_string(), historical);

        let reliability = situation
            .available_roles
            .iter()
            .map(|role| self.role_reliability(role))
            .fold(f64::NAN, f64::max);
        let reliability = if reliability.is_nan() {
            self.unknown_role_reliability
        } else {
            reliability
        };
        factors.insert("role_reliability".to_string(), reliability);

        let complexity_fit = match analysis.complexity {
            Complexity::Low => 0.9,
            Complexity::Medium => 0.6,
            Complexity::High => 0.3,
        };
        factors.insert("complexity_fit".to_string(), complexity_fit);

        let clarity = clarity(&situation.task.description);
        factors.insert("description_clarity".to_string(), clarity);

        let resources = if analysis.required_resources.is_empty() {
            0.8
        } else {
            0.6
        };
        factors.insert("resource_availability".to_string(), resources);

        let richness = (situation.context.len() as f64 / 10.0).min(1.0);
        factors.insert("context_richness".to_string(), richness);

        let value = historical * WEIGHT_HISTORICAL_SUCCESS
            + reliability * WEIGHT_ROLE_RELIABILITY
            + complexity_fit * WEIGHT_COMPLEXITY_FIT
            + clarity * WEIGHT_DESCRIPTION_CLARITY
            + resources * WEIGHT_RESOURCE_AVAILABILITY
            + richness * WEIGHT_CONTEXT_RICHNESS;

        let explanation = explain(value, &factors, similar.len());
        ConfidenceScore::new(value, factors, explanation)
    }
}

/// Length-bucketed clarity heuristic: longer descriptions are assumed to
/// carry more usable detail.
fn clarity(description: &str) -> f64 {
    match description.len() {
        0..=9 => 0.3,
        10..=49 => 0.5,
        50..=199 => 0.7,
        _ => 0.9,
    }
}

fn explain(value: f64, factors: &BTreeMap<String, f64>, similar_count: usize) -> String {
    let weakest = factors
        .iter()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(name, factor)| format!("{name} {factor:.2}"))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "confidence {value:.2} from {} factors over {similar_count} similar decisions; weakest: {weakest}",
        factors.len()
    )
}
