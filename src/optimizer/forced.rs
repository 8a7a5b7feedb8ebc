//! Forced decisions, synthesized on request without the trigger gate

use chrono::{DateTime, SubsecRound, Utc};

use super::heuristic::{baseline_values, DecisionHeuristic};
use super::impact::round_to;
use crate::config::defaults::{
    FORCED_ANOMALY_BELOW, FORCED_CO2_REDUCTION, FORCED_CONFIDENCE, FORCED_ENERGY_SAVING,
    FORCED_MAX_PREDICTED_BIT_TQ, FORCED_MIN_IMPROVEMENT, FORCED_SAVINGS_EUR_HOUR,
    FORCED_TARGET_BIT_TQ,
};
use crate::types::{ControlledParameter, Decision, DecisionKind, ParameterMap, Readings};

/// Fixed multiplier applied to each controlled parameter by a forced decision.
const fn forced_factor(param: ControlledParameter) -> f64 {
    match param {
        ControlledParameter::Fc1065 => 1.04,
        ControlledParameter::Li40054 => 1.05,
        ControlledParameter::Fc31007 => 0.97,
        ControlledParameter::Pi18213 => 1.04,
    }
}

impl DecisionHeuristic {
    /// Build a decision unconditionally from the given readings.
    ///
    /// Does not consult or advance the rate-limit clock.
    pub fn force_propose(&self, readings: &Readings, now: DateTime<Utc>) -> Decision {
        let analysis = self.classify(readings);
        let current = analysis.current_bit_tq;

        let changes: ParameterMap = ControlledParameter::ALL
            .into_iter()
            .map(|p| {
                let target = readings.parameter_or_default(p) * forced_factor(p);
                (p.name().to_string(), p.clamp(round_to(target, 3)))
            })
            .collect();

        let gain = (FORCED_TARGET_BIT_TQ - current).max(FORCED_MIN_IMPROVEMENT);
        let predicted = (current + gain).min(FORCED_MAX_PREDICTED_BIT_TQ);

        Decision {
            timestamp: now.trunc_subsecs(6),
            decision_type: DecisionKind::ForcedOptimization,
            confidence: FORCED_CONFIDENCE,
            predicted_bit_tq: round_to(predicted, 2),
            predicted_energy_saving: FORCED_ENERGY_SAVING,
            predicted_co2_reduction: FORCED_CO2_REDUCTION,
            parameter_changes: changes,
            baseline_values: baseline_values(readings),
            savings_eur_hour: FORCED_SAVINGS_EUR_HOUR,
            anomaly_detected: current < FORCED_ANOMALY_BELOW,
            applied: false,
            operator_approved: false,
            analysis: Some(analysis),
            predicted_hvbgo_flow_reduction: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_decision_targets() {
        let h = DecisionHeuristic::default();
        let readings = Readings {
            bit_tq: Some(44.0),
            ..Readings::fallback_base()
        };
        let d = h.force_propose(&readings, Utc::now());

        assert_eq!(d.decision_type, DecisionKind::ForcedOptimization);
        assert_eq!(d.confidence, 0.82);
        assert_eq!(d.predicted_bit_tq, 52.0);
        assert!(d.anomaly_detected);
        assert!(!d.applied);
        // 127.3 * 1.04 = 132.392
        assert_eq!(d.parameter_changes.get("fc1065"), Some(132.392));
        // 68.2 * 1.05 = 71.61
        assert_eq!(d.parameter_changes.get("li40054"), Some(71.61));
        // 2.14 * 1.04 = 2.2256 -> 2.226
        assert_eq!(d.parameter_changes.get("pi18213"), Some(2.226));
    }

    #[test]
    fn test_forced_prediction_capped() {
        let h = DecisionHeuristic::default();
        let healthy = Readings {
            bit_tq: Some(57.0),
            ..Readings::fallback_base()
        };
        let d = h.force_propose(&healthy, Utc::now());
        assert_eq!(d.predicted_bit_tq, 58.0);
        assert!(!d.anomaly_detected);
    }

    #[test]
    fn test_forced_values_clamped() {
        let h = DecisionHeuristic::default();
        let extreme = Readings {
            fc1065: Some(134.0),
            pi18213: Some(2.29),
            fc31007: Some(85.5),
            ..Readings::fallback_base()
        };
        let d = h.force_propose(&extreme, Utc::now());
        assert_eq!(d.parameter_changes.get("fc1065"), Some(135.0));
        assert_eq!(d.parameter_changes.get("pi18213"), Some(2.3));
        assert_eq!(d.parameter_changes.get("fc31007"), Some(85.0));
    }
}
