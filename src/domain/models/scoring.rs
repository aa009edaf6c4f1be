//! Confidence and risk value objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Weighted confidence score in [0, 1] with its contributing factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Final score, the weighted sum of factors clamped to [0, 1].
    pub value: f64,
    /// Named factor values, each in [0, 1].
    pub factors: BTreeMap<String, f64>,
    /// Human-readable summary of how the score came about.
    pub explanation: String,
}

impl ConfidenceScore {
    pub fn new(value: f64, factors: BTreeMap<String, f64>, explanation: String) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            factors,
            explanation,
        }
    }
}

/// Banded risk label derived from the total risk scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Band a total-risk scalar: critical >= 0.8, high >= 0.6, medium >= 0.4.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Worst-case risk assessment: the total is the maximum factor, never a sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Maximum of the factor values, in [0, 1].
    pub total_risk: f64,
    /// Band label for `total_risk`.
    pub level: RiskLevel,
    /// Named factor values, each in [0, 1].
    pub factors: BTreeMap<String, f64>,
    /// Human-readable summary naming the dominant factor.
    pub explanation: String,
}

impl RiskAssessment {
    /// Build an assessment from factor values. A single severe factor
    /// dominates the total.
    pub fn from_factors(factors: BTreeMap<String, f64>, explanation: String) -> Self {
        let total_risk = factors
            .values()
            .fold(0.0_f64, |acc, v| acc.max(*v))
            .clamp(0.0, 1.0);
        Self {
            total_risk,
            level: RiskLevel::from_score(total_risk),
            factors,
            explanation,
        }
    }

    /// Name and value of the largest factor, if any.
    pub fn dominant_factor(&self) -> Option<(&str, f64)> {
        self.factors
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, value)| (name.as_str(), *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let score = ConfidenceScore::new(1.4, BTreeMap::new(), String::new());
        assert!((score.value - 1.0).abs() < f64::EPSILON);
        let score = ConfidenceScore::new(-0.2, BTreeMap::new(), String::new());
        assert!(score.value.abs() < f64::EPSILON);
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Low);
    }

    #[test]
    fn test_total_is_max_not_sum() {
        let factors: BTreeMap<String, f64> = [
            ("a".to_string(), 0.5),
            ("b".to_string(), 0.4),
            ("c".to_string(), 0.3),
        ]
        .into_iter()
        .collect();
        // Sum is 1.2, max is 0.5.
        let assessment = RiskAssessment::from_factors(factors, String::new());
        assert!((assessment.total_risk - 0.5).abs() < f64::EPSILON);
        assert_eq!(assessment.level, RiskLevel::Medium);
    }

    #[test]
    fn test_dominant_factor() {
        let factors: BTreeMap<String, f64> =
            [("data".to_string(), 0.8), ("brand".to_string(), 0.2)]
                .into_iter()
                .collect();
        let assessment = RiskAssessment::from_factors(factors, String::new());
        assert_eq!(assessment.dominant_factor(), Some(("data", 0.8)));
    }

    #[test]
    fn test_empty_factors_zero_risk() {
        let assessment = RiskAssessment::from_factors(BTreeMap::new(), String::new());
        assert!(assessment.total_risk.abs() < f64::EPSILON);
        assert_eq!(assessment.level, RiskLevel::Low);
    }
}
