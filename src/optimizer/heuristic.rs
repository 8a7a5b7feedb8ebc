//! Core decision heuristic: classification, trigger gate and parameter targets
//!
//! Every function here is pure. The time of the last proposal is passed in and
//! the updated value handed back in [`Proposal`], so the caller owns the
//! rate-limit clock.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;
use tracing::{debug, info};

use super::impact::{predict_impact, round_to};
use crate::config::defaults::{
    ANOMALY_HIGH, ANOMALY_LOW, SEVERE_ANOMALY_HIGH, SEVERE_ANOMALY_LOW, URGENCY_CRITICAL_BELOW,
    URGENCY_HIGH_BELOW, URGENCY_MEDIUM_BELOW,
};
use crate::config::HeuristicConfig;
use crate::types::{
    AnomalySeverity, Analysis, ControlledParameter, Decision, DecisionKind, ParameterMap,
    Readings, UrgencyLevel,
};

/// Result of one `propose` call.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// The new decision, if the gate let one through
    pub decision: Option<Decision>,
    /// Rate-limit clock to carry into the next call
    pub last_decision_at: Option<DateTime<Utc>>,
}

/// Decision heuristic with its tunable thresholds.
#[derive(Debug, Clone)]
pub struct DecisionHeuristic {
    target_bit_tq: f64,
    cooldown: Duration,
    ceiling: Duration,
    base_confidence: f64,
}

impl Default for DecisionHeuristic {
    fn default() -> Self {
        Self::new(&HeuristicConfig::default())
    }
}

impl DecisionHeuristic {
    pub fn new(config: &HeuristicConfig) -> Self {
        Self {
            target_bit_tq: config.target_bit_tq,
            cooldown: secs(config.cooldown_secs),
            ceiling: secs(config.ceiling_secs),
            base_confidence: config.base_confidence,
        }
    }

    pub fn target_bit_tq(&self) -> f64 {
        self.target_bit_tq
    }

    pub(crate) fn base_confidence(&self) -> f64 {
        self.base_confidence
    }

    /// Classify the quality index of one set of readings.
    pub fn classify(&self, readings: &Readings) -> Analysis {
        let current = readings.quality_index();
        let target = self.target_bit_tq;

        let anomaly_detected = !(ANOMALY_LOW..=ANOMALY_HIGH).contains(&current);
        let anomaly_severity = if !anomaly_detected {
            None
        } else if !(SEVERE_ANOMALY_LOW..=SEVERE_ANOMALY_HIGH).contains(&current) {
            Some(AnomalySeverity::High)
        } else {
            Some(AnomalySeverity::Medium)
        };

        Analysis {
            current_bit_tq: current,
            target_bit_tq: target,
            needs_optimization: current < target,
            anomaly_detected,
            anomaly_severity,
            deviation_percentage: (target - current) / target * 100.0,
            urgency_level: self.urgency(current),
        }
    }

    fn urgency(&self, bit_tq: f64) -> UrgencyLevel {
        if bit_tq < URGENCY_CRITICAL_BELOW {
            UrgencyLevel::Critical
        } else if bit_tq < URGENCY_HIGH_BELOW {
            UrgencyLevel::High
        } else if bit_tq < URGENCY_MEDIUM_BELOW {
            UrgencyLevel::Medium
        } else if bit_tq < self.target_bit_tq {
            UrgencyLevel::Low
        } else {
            UrgencyLevel::Normal
        }
    }

    /// Trigger gate.
    ///
    /// `since_last` is the time since the previous proposal, `None` if there
    /// has been none. Inside the cooldown nothing passes. Otherwise a proposal
    /// is due when the quality index is below target or anomalous, or when the
    /// ceiling has elapsed and urgency is anything but NORMAL.
    pub fn should_propose(&self, analysis: &Analysis, since_last: Option<Duration>) -> bool {
        if let Some(elapsed) = since_last {
            if elapsed < self.cooldown {
                return false;
            }
        }

        if analysis.needs_optimization || analysis.anomaly_detected {
            return true;
        }

        let ceiling_passed = since_last.map_or(true, |elapsed| elapsed > self.ceiling);
        ceiling_passed && analysis.urgency_level != UrgencyLevel::Normal
    }

    /// Target value for every controlled parameter at the given urgency.
    ///
    /// Each value is `current * (1 + base_adjustment * sensitivity * multiplier)`
    /// rounded to three decimals and clamped into the safe range.
    pub fn adjust_parameters(&self, readings: &Readings, urgency: UrgencyLevel) -> ParameterMap {
        let multiplier = urgency.multiplier();
        ControlledParameter::ALL
            .into_iter()
            .map(|p| {
                let current = readings.parameter_or_default(p);
                let adjustment = p.base_adjustment() * p.sensitivity() * multiplier;
                let target = p.clamp(round_to(current * (1.0 + adjustment), 3));
                (p.name().to_string(), target)
            })
            .collect()
    }

    /// Propose a decision if the gate allows it.
    ///
    /// A successful proposal sets the returned clock to `now`; a refusal hands
    /// back `last_decision_at` unchanged.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        readings: &Readings,
        last_decision_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Proposal {
        let analysis = self.classify(readings);
        let since_last = last_decision_at.map(|at| now - at);

        if !self.should_propose(&analysis, since_last) {
            debug!(
                bit_tq = analysis.current_bit_tq,
                urgency = %analysis.urgency_level,
                "No decision warranted"
            );
            return Proposal {
                decision: None,
                last_decision_at,
            };
        }

        let decision = self.build_decision(readings, analysis, now, rng);
        Proposal {
            decision: Some(decision),
            last_decision_at: Some(now),
        }
    }

    fn build_decision<R: Rng + ?Sized>(
        &self,
        readings: &Readings,
        analysis: Analysis,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Decision {
        let changes = self.adjust_parameters(readings, analysis.urgency_level);
        let baseline = baseline_values(readings);
        let impact = predict_impact(self, readings, &changes, rng);

        info!(
            bit_tq = analysis.current_bit_tq,
            target = analysis.target_bit_tq,
            urgency = %analysis.urgency_level,
            parameters = changes.len(),
            savings_eur_hour = impact.savings_eur_hour,
            confidence = impact.confidence,
            "Decision proposed"
        );

        Decision {
            timestamp: now.trunc_subsecs(6),
            decision_type: DecisionKind::AiOptimization,
            confidence: impact.confidence,
            predicted_bit_tq: impact.predicted_bit_tq,
            predicted_energy_saving: impact.energy_saving,
            predicted_co2_reduction: impact.co2_reduction,
            parameter_changes: changes,
            baseline_values: baseline,
            savings_eur_hour: impact.savings_eur_hour,
            anomaly_detected: analysis.anomaly_detected,
            applied: false,
            operator_approved: false,
            analysis: Some(analysis),
            predicted_hvbgo_flow_reduction: Some(impact.hvbgo_flow_reduction),
        }
    }
}

/// Defaulted current value of every controlled parameter.
pub(crate) fn baseline_values(readings: &Readings) -> ParameterMap {
    ControlledParameter::ALL
        .into_iter()
        .map(|p| (p.name().to_string(), readings.parameter_or_default(p)))
        .collect()
}

fn secs(n: u64) -> Duration {
    Duration::from_std(std::time::Duration::from_secs(n)).unwrap_or(Duration::MAX)
}
