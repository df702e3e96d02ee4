//! Zone-level crowd density and safety scoring.

use crate::config::MonitorConfig;
use common::analytics::AnalyticsSample;
use common::validation::clamp_unit;
use std::collections::HashMap;

/// Density and safety figures for one evaluated sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityScore {
    /// Person count normalized against zone capacity, in `[0, 1]`
    pub crowd_density: f64,
    /// Percentage in `[0, 100]`; decreases with density and clustering
    pub safety_score: f64,
}

/// Pure scorer: identical inputs always produce identical outputs.
///
/// Capacity comes from configuration, not from the sample, so that a
/// misbehaving producer cannot skew density by overstating capacity.
#[derive(Debug, Clone)]
pub struct DensityEvaluator {
    default_capacity: u32,
    capacities: HashMap<String, u32>,
    density_weight: f64,
    cluster_penalty: f64,
}

impl DensityEvaluator {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            default_capacity: config.default_zone_capacity,
            capacities: config.zone_capacities.clone(),
            density_weight: config.density_weight,
            cluster_penalty: config.cluster_penalty,
        }
    }

    pub fn capacity_for(&self, zone_id: &str) -> u32 {
        self.capacities
            .get(zone_id)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    /// Score one sample. `dangerous_clusters` is the count of clusters the
    /// detector classified as dangerous for this same sample.
    pub fn evaluate(&self, sample: &AnalyticsSample, dangerous_clusters: usize) -> DensityScore {
        let capacity = self.capacity_for(&sample.zone_id).max(1);
        let crowd_density = clamp_unit(f64::from(sample.person_count) / f64::from(capacity));

        let penalty = self.density_weight * crowd_density
            + self.cluster_penalty * dangerous_clusters as f64;
        let safety_score = (100.0 - penalty).clamp(0.0, 100.0);

        DensityScore {
            crowd_density,
            safety_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> DensityEvaluator {
        let mut config = MonitorConfig::default();
        config.zone_capacities.insert("GateB".to_string(), 250);
        DensityEvaluator::new(&config)
    }

    #[test]
    fn density_is_count_over_capacity() {
        let sample = AnalyticsSample::new("MainStage", 85);
        let score = evaluator().evaluate(&sample, 0);
        assert!((score.crowd_density - 0.85).abs() < 1e-9);
    }

    #[test]
    fn density_clamps_above_capacity() {
        let sample = AnalyticsSample::new("MainStage", 150);
        let score = evaluator().evaluate(&sample, 0);
        assert_eq!(score.crowd_density, 1.0);
    }

    #[test]
    fn per_zone_capacity_overrides_default() {
        let sample = AnalyticsSample::new("GateB", 50);
        let score = evaluator().evaluate(&sample, 0);
        assert!((score.crowd_density - 0.2).abs() < 1e-9);
    }

    #[test]
    fn safety_decreases_with_density() {
        let evaluator = evaluator();
        let low = evaluator.evaluate(&AnalyticsSample::new("MainStage", 20), 0);
        let high = evaluator.evaluate(&AnalyticsSample::new("MainStage", 80), 0);
        assert!(high.safety_score < low.safety_score);
    }

    #[test]
    fn safety_decreases_with_dangerous_clusters() {
        let evaluator = evaluator();
        let sample = AnalyticsSample::new("MainStage", 20);
        let none = evaluator.evaluate(&sample, 0);
        let two = evaluator.evaluate(&sample, 2);
        assert!((none.safety_score - two.safety_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn safety_never_goes_negative() {
        let sample = AnalyticsSample::new("MainStage", 100);
        let score = evaluator().evaluate(&sample, 50);
        assert_eq!(score.safety_score, 0.0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let evaluator = evaluator();
        let sample = AnalyticsSample::new("MainStage", 42);
        assert_eq!(
            evaluator.evaluate(&sample, 1),
            evaluator.evaluate(&sample, 1)
        );
    }
}
