//! Risk assessor.
//!
//! Six independent factors, combined by taking the maximum. One severe
//! factor dominates no matter how benign the rest look; risks do not
//! average away.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::models::{Complexity, RiskAssessment, Situation, SituationAnalysis};

// Keyword tables scanned against the lowercased title and description.
const DATA_KEYWORDS: &[&str] = &[
    "password",
    "credential",
    "secret",
    "token",
    "pii",
    "personal data",
    "payment",
    "credit card",
];
const BRAND_KEYWORDS: &[&str] = &[
    "marketing",
    "social",
    "public",
    "announcement",
    "blog",
    "press",
    "campaign",
];
const LEGAL_KEYWORDS: &[&str] = &[
    "gdpr",
    "hipaa",
    "compliance",
    "legal",
    "regulation",
    "license",
    "audit",
];

/// Estimated cost above which the financial factor kicks in.
const FINANCIAL_COST_CUTOFF: f64 = 1000.0;

/// Computes a [`RiskAssessment`] for a situation. No side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAssessor;

impl RiskAssessor {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, situation: &Situation, analysis: &SituationAnalysis) -> RiskAssessment {
        let mut factors = BTreeMap::new();
        let description = situation.task.description.to_lowercase();

        factors.insert(
            "business_impact".to_string(),
            business_impact(situation.task.priority),
        );

        let technical = match analysis.complexity {
            Complexity::High => 0.7,
            Complexity::Medium => 0.4,
            Complexity::Low => 0.2,
        };
        factors.insert("technical".to_string(), technical);

        factors.insert(
            "data".to_string(),
            keyword_risk(&description, DATA_KEYWORDS, 0.8, 0.2),
        );

        // Brand exposure comes from how the task is labelled, not its prose.
        let brand_tagged = situation
            .task
            .tags
            .iter()
            .any(|tag| BRAND_KEYWORDS.contains(&tag.as_str()));
        factors.insert("brand".to_string(), if brand_tagged { 0.6 } else { 0.2 });

        factors.insert(
            "financial".to_string(),
            if estimated_cost(situation) > FINANCIAL_COST_CUTOFF {
                0.7
            } else {
                0.2
            },
        );
        factors.insert(
            "legal".to_string(),
            keyword_risk(&description, LEGAL_KEYWORDS, 0.8, 0.1),
        );

        let explanation = factors
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, value)| format!("dominant risk factor {name} at {value:.2}"))
            .unwrap_or_else(|| "no risk factors".to_string());
        RiskAssessment::from_factors(factors, explanation)
    }
}

/// Priority 1 (lowest stakes) through 5 (highest).
fn business_impact(priority: u8) -> f64 {
    match priority {
        1 => 0.1,
        2 => 0.2,
        3 => 0.4,
        4 => 0.6,
        _ => 0.8,
    }
}

fn keyword_risk(text: &str, keywords: &[&str], hit: f64, miss: f64) -> f64 {
    if keywords.iter().any(|kw| text.contains(kw)) {
        hit
    } else {
        miss
    }
}

fn estimated_cost(situation: &Situation) -> f64 {
    situation
        .context
        .get("cost")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}
