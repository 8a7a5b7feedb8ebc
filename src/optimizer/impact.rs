//! Predicted impact of a set of parameter changes

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::heuristic::DecisionHeuristic;
use crate::config::defaults::{
    CO2_REDUCTION_PER_POINT, CONFIDENCE_NOISE_STD, ENERGY_SAVING_PER_POINT,
    HVBGO_REDUCTION_PER_POINT, IMPROVEMENT_NOISE_FRACTION, IMPROVEMENT_SCALE, MAX_CO2_REDUCTION,
    MAX_CONFIDENCE, MAX_ENERGY_SAVING, MAX_IMPROVEMENT_FACTOR, MIN_CONFIDENCE,
    MIN_IMPROVEMENT_FACTOR, MIN_IMPROVEMENT_NOISE_STD, MONTHLY_SAVINGS_PER_5PCT,
};
use crate::types::{ControlledParameter, ParameterMap, Readings};

/// Predictions attached to a proposed decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactPrediction {
    /// Quality points gained, never negative
    pub improvement: f64,
    pub predicted_bit_tq: f64,
    pub energy_saving: f64,
    pub co2_reduction: f64,
    pub savings_eur_hour: f64,
    pub hvbgo_flow_reduction: f64,
    pub confidence: f64,
}

/// Weighted relative change of every controlled parameter, in quality points.
pub fn expected_improvement(readings: &Readings, changes: &ParameterMap) -> f64 {
    ControlledParameter::ALL
        .into_iter()
        .filter_map(|p| {
            let target = changes.get(p.name())?;
            let current = readings.parameter_or_default(p);
            Some((target - current) / current * p.sensitivity() * IMPROVEMENT_SCALE)
        })
        .sum()
}

/// Zero-mean Gaussian sample. A degenerate deviation yields 0.
fn gaussian<R: Rng + ?Sized>(std_dev: f64, rng: &mut R) -> f64 {
    Normal::new(0.0, std_dev).map_or(0.0, |dist| dist.sample(rng))
}

/// Predict the outcome of applying `changes`.
///
/// The expected improvement is perturbed by noise proportional to its size
/// and floored at zero. Savings scale with the improvement up to fixed caps.
pub fn predict_impact<R: Rng + ?Sized>(
    heuristic: &DecisionHeuristic,
    readings: &Readings,
    changes: &ParameterMap,
    rng: &mut R,
) -> ImpactPrediction {
    let expected = expected_improvement(readings, changes);
    let noise_std = (expected.abs() * IMPROVEMENT_NOISE_FRACTION).max(MIN_IMPROVEMENT_NOISE_STD);
    let improvement = (expected + gaussian(noise_std, rng)).max(0.0);

    let energy_saving = (improvement * ENERGY_SAVING_PER_POINT).min(MAX_ENERGY_SAVING);
    let co2_reduction = (improvement * CO2_REDUCTION_PER_POINT).min(MAX_CO2_REDUCTION);

    let five_percent = heuristic.target_bit_tq() * 0.05;
    let factor = (improvement / five_percent).clamp(MIN_IMPROVEMENT_FACTOR, MAX_IMPROVEMENT_FACTOR);
    let monthly = MONTHLY_SAVINGS_PER_5PCT * factor;

    let confidence = (heuristic.base_confidence() + gaussian(CONFIDENCE_NOISE_STD, rng))
        .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

    ImpactPrediction {
        improvement,
        predicted_bit_tq: round_to(readings.quality_index() + improvement, 2),
        energy_saving: round_to(energy_saving, 3),
        co2_reduction: round_to(co2_reduction, 3),
        savings_eur_hour: round_to(monthly / (30.0 * 24.0), 2),
        hvbgo_flow_reduction: round_to(improvement * HVBGO_REDUCTION_PER_POINT, 2),
        confidence: round_to(confidence, 3),
    }
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(130.21266, 3), 130.213);
        assert_eq!(round_to(2.345, 0), 2.0);
        assert_eq!(round_to(-1.005, 1), -1.0);
    }

    #[test]
    fn test_no_change_no_expected_improvement() {
        let readings = Readings::fallback_base();
        assert_eq!(expected_improvement(&readings, &ParameterMap::baseline()), 0.0);
    }

    #[test]
    fn test_impact_bounds() {
        let h = DecisionHeuristic::default();
        let readings = Readings::fallback_base();
        let mut rng = StdRng::seed_from_u64(42);
        for urgency in [
            crate::types::UrgencyLevel::Critical,
            crate::types::UrgencyLevel::Normal,
        ] {
            let changes = h.adjust_parameters(&readings, urgency);
            for _ in 0..200 {
                let impact = predict_impact(&h, &readings, &changes, &mut rng);
                assert!(impact.improvement >= 0.0);
                assert!(impact.energy_saving <= MAX_ENERGY_SAVING);
                assert!(impact.co2_reduction <= MAX_CO2_REDUCTION);
                assert!((0.5..=1.0).contains(&impact.confidence));
                // factor capped at 4x a 5% improvement
                assert!(impact.savings_eur_hour <= 27_781.0 * 4.0 / 720.0 + 0.01);
                assert!(impact.savings_eur_hour > 0.0);
            }
        }
    }
}
