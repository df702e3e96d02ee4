//! Spatial clustering of detection points.
//!
//! Global zone density can look safe while one corner is critically packed;
//! this detector finds those pockets by grouping detections that sit within a
//! configured proximity radius of each other and classifying each group by
//! its local density.

use crate::config::MonitorConfig;
use chrono::{DateTime, Utc};
use common::analytics::{AnalyticsSample, DetectionPoint};
use serde::Serialize;
use std::cmp::Ordering;

/// One spatial cluster of detections.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Cluster {
    /// Mean position of all members (x, y)
    pub centroid: (f64, f64),
    pub member_count: usize,
    /// Members per square pixel of the cluster's spread circle
    pub local_density: f64,
}

/// Clusters found in one sample, sorted by descending local density.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterResult {
    pub zone_id: String,
    pub timestamp: DateTime<Utc>,
    pub clusters: Vec<Cluster>,
}

/// Pure function of a sample plus static configuration; no I/O.
#[derive(Debug, Clone)]
pub struct ClusterDetector {
    radius: f64,
    min_cluster_size: usize,
    density_threshold: f64,
}

impl ClusterDetector {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            radius: config.cluster_radius,
            min_cluster_size: config.min_cluster_size,
            density_threshold: config.cluster_density_threshold,
        }
    }

    /// Group detection points using simple distance-based clustering.
    pub fn detect(&self, sample: &AnalyticsSample) -> ClusterResult {
        ClusterResult {
            zone_id: sample.zone_id.clone(),
            timestamp: sample.timestamp,
            clusters: self.cluster_points(&sample.detections),
        }
    }

    /// Whether a cluster's local density exceeds the danger threshold.
    pub fn is_dangerous(&self, cluster: &Cluster) -> bool {
        cluster.local_density >= self.density_threshold
    }

    /// Count of dangerous clusters in a result.
    pub fn dangerous_count(&self, result: &ClusterResult) -> usize {
        result
            .clusters
            .iter()
            .filter(|c| self.is_dangerous(c))
            .count()
    }

    fn cluster_points(&self, points: &[DetectionPoint]) -> Vec<Cluster> {
        if points.is_empty() {
            return vec![];
        }

        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut assigned = vec![false; points.len()];

        for i in 0..points.len() {
            if assigned[i] {
                continue;
            }

            let mut group = vec![i];
            assigned[i] = true;

            // Find nearby points
            for j in 0..points.len() {
                if assigned[j] {
                    continue;
                }

                // Check distance to any member of the current group
                for &member in &group {
                    if calculate_distance(&points[member], &points[j]) < self.radius {
                        group.push(j);
                        assigned[j] = true;
                        break;
                    }
                }
            }

            if group.len() >= self.min_cluster_size {
                groups.push(group);
            }
        }

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|indices| {
                let count = indices.len();
                let centroid_x =
                    indices.iter().map(|&i| points[i].x).sum::<f64>() / count as f64;
                let centroid_y =
                    indices.iter().map(|&i| points[i].y).sum::<f64>() / count as f64;

                // Spread is the farthest member from the centroid, floored at
                // one pixel so a perfectly stacked group has finite density.
                let spread = indices
                    .iter()
                    .map(|&i| {
                        let dx = points[i].x - centroid_x;
                        let dy = points[i].y - centroid_y;
                        (dx * dx + dy * dy).sqrt()
                    })
                    .fold(0.0_f64, f64::max)
                    .max(1.0);

                let area = std::f64::consts::PI * spread * spread;

                Cluster {
                    centroid: (centroid_x, centroid_y),
                    member_count: count,
                    local_density: count as f64 / area,
                }
            })
            .collect();

        // Densest first; ties broken by centroid position for determinism
        clusters.sort_by(|a, b| {
            b.local_density
                .partial_cmp(&a.local_density)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    a.centroid
                        .0
                        .partial_cmp(&b.centroid.0)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    a.centroid
                        .1
                        .partial_cmp(&b.centroid.1)
                        .unwrap_or(Ordering::Equal)
                })
        });

        clusters
    }
}

/// Euclidean distance between two detection points.
fn calculate_distance(a: &DetectionPoint, b: &DetectionPoint) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}
