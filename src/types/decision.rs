//! Optimization decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ParameterMap;

/// Coarse classification of how far the quality index sits below target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Critical,
    High,
    Medium,
    Low,
    Normal,
}

impl UrgencyLevel {
    /// Scale applied to every base parameter adjustment.
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::High => 1.2,
            Self::Medium => 1.0,
            Self::Low => 0.8,
            Self::Normal => 0.5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to an anomalous quality index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalySeverity {
    Medium,
    High,
}

/// Result of classifying one set of readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub current_bit_tq: f64,
    pub target_bit_tq: f64,
    /// Quality index below target
    pub needs_optimization: bool,
    pub anomaly_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_severity: Option<AnomalySeverity>,
    /// `(target - current) / target * 100`
    pub deviation_percentage: f64,
    pub urgency_level: UrgencyLevel,
}

/// Origin of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Produced by the decision cycle under the cooldown/urgency gate
    AiOptimization,
    /// Synthesized on request, bypassing the gate
    ForcedOptimization,
}

impl DecisionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiOptimization => "ai_optimization",
            Self::ForcedOptimization => "forced_optimization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai_optimization" => Some(Self::AiOptimization),
            "forced_optimization" => Some(Self::ForcedOptimization),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Economic projection derived from the predicted quality improvement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicImpact {
    pub hourly_savings_eur: f64,
    pub monthly_savings_eur: f64,
    pub annual_potential_eur: f64,
}

impl EconomicImpact {
    /// Project monthly and annual figures from an hourly rate (30-day month).
    pub fn from_hourly(hourly_savings_eur: f64) -> Self {
        let hourly = hourly_savings_eur.max(0.0);
        let monthly = hourly * 30.0 * 24.0;
        Self {
            hourly_savings_eur: hourly,
            monthly_savings_eur: monthly,
            annual_potential_eur: monthly * 12.0,
        }
    }
}

/// A proposed or executed corrective action.
///
/// `timestamp` is the natural key used to address the decision in the store;
/// it is truncated to microseconds at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub decision_type: DecisionKind,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    pub predicted_bit_tq: f64,
    /// Fractional energy saving (0.05 = 5%)
    pub predicted_energy_saving: f64,
    /// Fractional CO2 reduction
    pub predicted_co2_reduction: f64,
    /// Target value per field variable
    pub parameter_changes: ParameterMap,
    /// Value per field variable at proposal time
    pub baseline_values: ParameterMap,
    pub savings_eur_hour: f64,
    pub anomaly_detected: bool,
    pub applied: bool,
    pub operator_approved: bool,
    /// Classification at proposal time; not persisted by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    /// Predicted reduction of HVbGO recirculation flow; not persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_hvbgo_flow_reduction: Option<f64>,
}

impl Decision {
    pub fn economic_impact(&self) -> EconomicImpact {
        EconomicImpact::from_hourly(self.savings_eur_hour)
    }

    pub const fn is_pending(&self) -> bool {
        !self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_multipliers_are_monotonic() {
        let levels = [
            UrgencyLevel::Critical,
            UrgencyLevel::High,
            UrgencyLevel::Medium,
            UrgencyLevel::Low,
            UrgencyLevel::Normal,
        ];
        for pair in levels.windows(2) {
            assert!(pair[0].multiplier() > pair[1].multiplier());
        }
    }

    #[test]
    fn test_urgency_serializes_uppercase() {
        let json = serde_json::to_string(&UrgencyLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn test_decision_kind_tags() {
        for kind in [DecisionKind::AiOptimization, DecisionKind::ForcedOptimization] {
            assert_eq!(DecisionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DecisionKind::parse("optimization"), None);
    }

    #[test]
    fn test_economic_impact_projection() {
        let impact = EconomicImpact::from_hourly(10.0);
        assert!((impact.monthly_savings_eur - 7200.0).abs() < 1e-9);
        assert!((impact.annual_potential_eur - 86_400.0).abs() < 1e-9);
        assert_eq!(EconomicImpact::from_hourly(-5.0).hourly_savings_eur, 0.0);
    }
}
