use serde::{Deserialize, Serialize};

/// Tunables for peak extraction.
///
/// Every constant that shapes clustering and grid alignment lives here rather
/// than in the algorithm body, so a deployment can be tuned without touching
/// code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakConfig {
    /// Exponent applied to sample amplitude when weighting the sub-sample
    /// centroid. Higher values sharpen the estimate toward the cluster
    /// maximum.
    pub centroid_bias: f64,
    /// Fractional deviation from the median peak spacing tolerated when
    /// matching candidates to expected slots (e.g. 0.13 = 13%).
    pub allowed_deviation: f64,
    /// Divisor applied to `min_peak_freq` to derive the clustering gap:
    /// candidates further apart than `max(3, round(min_peak_freq / divisor))`
    /// start a new cluster.
    pub cluster_gap_divisor: f64,
    /// Minimum cluster membership below which a cluster is discarded as
    /// noise. `None` derives `max(2, round(min_peak_freq / 4))`.
    pub min_cluster_size: Option<usize>,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            centroid_bias: 2.0,
            allowed_deviation: 0.13,
            cluster_gap_divisor: 5.0,
            min_cluster_size: None,
        }
    }
}

impl PeakConfig {
    /// Effective minimum cluster size for a given expected peak spacing.
    pub fn effective_min_cluster_size(&self, min_peak_freq: usize) -> usize {
        self.min_cluster_size
            .unwrap_or_else(|| ((min_peak_freq as f64 / 4.0).round() as usize).max(2))
    }

    /// Clustering gap for a given expected peak spacing.
    pub fn max_gap(&self, min_peak_freq: usize) -> usize {
        ((min_peak_freq as f64 / self.cluster_gap_divisor).round() as usize).max(3)
    }
}

/// Line sweep motion parameters, in normalized display units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Distance the line advances per ingestion cycle.
    pub speed: f64,
    /// Line thickness perpendicular to its length.
    pub thickness: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            speed: 0.004,
            thickness: 0.02,
        }
    }
}

/// Parameters for the halving bounds search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsSearchConfig {
    /// Raw intensity above which a cycle counts as a hit.
    pub hit_threshold: i32,
    /// Search terminates once either side of the candidate rectangle shrinks
    /// below this extent.
    pub min_extent: f64,
}

impl Default for BoundsSearchConfig {
    fn default() -> Self {
        Self {
            hit_threshold: 128,
            min_extent: 1.0 / 64.0,
        }
    }
}

/// Configuration for the calibrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratorConfig {
    /// Sensor columns in the array.
    pub x_count: usize,
    /// Sensor rows in the array.
    pub y_count: usize,
    /// Display slices calibrated per sensor; also the number of peaks each
    /// sweep is expected to produce in a sensor's trace.
    pub slice_count: usize,
    /// Minimum amplitude above the windowed neighborhood for a sample to
    /// qualify as a peak candidate.
    pub min_peak_amplitude: i32,
    /// Expected sample spacing between adjacent slice crossings.
    pub min_peak_freq: usize,
    /// Peak extraction tunables.
    pub peak: PeakConfig,
    /// Line sweep motion parameters.
    pub sweep: SweepConfig,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            x_count: 3,
            y_count: 3,
            slice_count: 3,
            min_peak_amplitude: 10,
            min_peak_freq: 10,
            peak: PeakConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl CalibratorConfig {
    /// Total sensor count, which is also the reading count expected per
    /// ingestion cycle.
    pub fn sensor_count(&self) -> usize {
        self.x_count * self.y_count
    }
}
