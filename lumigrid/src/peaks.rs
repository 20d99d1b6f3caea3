//! Peak extraction over raw intensity traces.
//!
//! Turns a noisy integer intensity sequence recorded during a line sweep into
//! a fixed number of sub-sample peak positions aligned to an equally-spaced
//! grid. Peaks that cannot be matched to their expected slot are reported as
//! [`MISSING_PEAK`].
//!
//! The pipeline is deterministic: baseline removal, a windowed membership
//! test, gap clustering, power-weighted centroids, then alignment of the
//! surviving centroids against the spacing grid implied by their median
//! separation.

use crate::config::PeakConfig;
use crate::error::CalibError;

/// Sentinel for an expected peak slot with no matching candidate.
///
/// Valid peak positions live in non-negative sample-index space, so any
/// negative value is unambiguous; this constant is the one emitted.
pub const MISSING_PEAK: f64 = -1.0;

/// True if a result slot holds the missing sentinel rather than a position.
pub fn is_missing(value: f64) -> bool {
    value < 0.0
}

/// Extract `expected_peaks` sub-sample peak positions from a raw trace.
///
/// The result always has length `expected_peaks`, ordered by expected slot
/// position (ascending); unmatched slots hold [`MISSING_PEAK`]. A trace with
/// no qualifying candidates at all (broken or disconnected sensor) is a
/// normal outcome: it returns a fully sentinel-filled result and logs a
/// warning rather than failing.
///
/// Fails with [`CalibError::InsufficientDataForWindow`] when the trace is too
/// short for the membership window implied by `min_peak_freq`.
pub fn extract(
    data: &[i32],
    min_amplitude: i32,
    min_peak_freq: usize,
    expected_peaks: usize,
    config: &PeakConfig,
) -> Result<Vec<f64>, CalibError> {
    let half_window = (min_peak_freq as f64 / 2.0).round() as usize;
    if data.len() < 2 * half_window || data.is_empty() {
        return Err(CalibError::InsufficientDataForWindow {
            len: data.len(),
            min_peak_freq,
        });
    }
    if expected_peaks == 0 {
        return Ok(Vec::new());
    }

    // Amplitude thresholds are relative: strip the sensor/ambient offset.
    let min_val = *data.iter().min().expect("trace is non-empty");
    let shifted: Vec<i32> = data.iter().map(|v| v - min_val).collect();

    let candidates = candidate_indices(&shifted, min_amplitude, half_window);
    if candidates.is_empty() {
        log::warn!(
            "no peaks found in {}-sample trace (min_amplitude={min_amplitude})",
            data.len()
        );
        return Ok(vec![MISSING_PEAK; expected_peaks]);
    }

    let clusters = cluster_candidates(&candidates, config.max_gap(min_peak_freq));
    let min_size = config.effective_min_cluster_size(min_peak_freq);

    let mut centroids = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        if cluster.len() < min_size {
            log::debug!(
                "discarding {}-member cluster at sample {} (min size {min_size})",
                cluster.len(),
                cluster[0]
            );
            continue;
        }
        match weighted_centroid(&shifted, cluster, config.centroid_bias) {
            Ok(c) => centroids.push(c),
            Err(e) => log::warn!("{e}; cluster dropped"),
        }
    }

    if centroids.is_empty() {
        log::warn!(
            "no peak clusters survived filtering in {}-sample trace",
            data.len()
        );
        return Ok(vec![MISSING_PEAK; expected_peaks]);
    }
    centroids.sort_by(f64::total_cmp);

    Ok(align_to_grid(&centroids, expected_peaks, config))
}

/// Indices whose amplitude stands `min_amplitude` above both window edges.
///
/// An edge falling outside the trace contributes zero, matching the behavior
/// of a sweep entering or leaving the sensor's field.
fn candidate_indices(shifted: &[i32], min_amplitude: i32, half_window: usize) -> Vec<usize> {
    let len = shifted.len();
    (0..len)
        .filter(|&i| {
            let lo = if i >= half_window {
                shifted[i - half_window]
            } else {
                0
            };
            let hi = if i + half_window < len {
                shifted[i + half_window]
            } else {
                0
            };
            shifted[i] - lo > min_amplitude && shifted[i] - hi > min_amplitude
        })
        .collect()
}

/// Group ascending candidate indices into clusters split at gaps of
/// `max_gap` samples or more.
fn cluster_candidates(candidates: &[usize], max_gap: usize) -> Vec<Vec<usize>> {
    let mut clusters = Vec::new();
    let mut current = vec![candidates[0]];
    for &idx in &candidates[1..] {
        let prev = *current.last().expect("cluster is non-empty");
        if idx - prev >= max_gap {
            clusters.push(std::mem::replace(&mut current, vec![idx]));
        } else {
            current.push(idx);
        }
    }
    clusters.push(current);
    clusters
}

/// Power-weighted sub-sample centroid of a cluster.
fn weighted_centroid(shifted: &[i32], cluster: &[usize], bias: f64) -> Result<f64, CalibError> {
    let mut weight_sum = 0.0;
    let mut weighted_pos = 0.0;
    for &d in cluster {
        let w = (shifted[d] as f64).powf(bias);
        weight_sum += w;
        weighted_pos += d as f64 * w;
    }
    if weight_sum == 0.0 {
        return Err(CalibError::DegenerateCluster {
            start: cluster[0],
            len: cluster.len(),
        });
    }
    Ok(weighted_pos / weight_sum)
}

/// Align sorted centroids to an equally-spaced grid of `expected_peaks`
/// slots.
///
/// The median of successive centroid differences estimates the slot spacing;
/// the phase of the grid comes from a centroid adjacent to a median-valued
/// (trustworthy) gap. When interior peaks are missing the median difference
/// is an integer multiple of the true spacing, so integer subdivisions of it
/// are also tried; the grid placement matching the most centroids wins, the
/// finest spacing breaking ties. Centroids are consumed greedily nearest-first
/// so each matches at most one slot.
fn align_to_grid(centroids: &[f64], expected_peaks: usize, config: &PeakConfig) -> Vec<f64> {
    if centroids.len() == 1 {
        log::warn!("single peak candidate; spacing grid cannot be estimated");
        let mut out = vec![MISSING_PEAK; expected_peaks];
        out[0] = centroids[0];
        return out;
    }

    let diffs: Vec<f64> = centroids.windows(2).map(|w| w[1] - w[0]).collect();
    let mut sorted_diffs = diffs.clone();
    sorted_diffs.sort_by(f64::total_cmp);
    let median = sorted_diffs[sorted_diffs.len() / 2];

    for (i, d) in diffs.iter().enumerate() {
        if (d - median).abs() > config.allowed_deviation * median {
            log::debug!(
                "peak spacing outlier: gap {i} is {d:.2} samples vs median {median:.2}"
            );
        }
    }

    let median_index = diffs
        .iter()
        .position(|d| *d == median)
        .expect("median is drawn from diffs");
    let anchor = centroids[median_index];
    if median <= 0.0 {
        log::warn!("degenerate peak spacing ({median}); emitting candidates in order");
        return fill_in_order(centroids, expected_peaks);
    }

    let first = centroids[0];
    let last = *centroids.last().expect("centroids are non-empty");

    let mut best: Option<(usize, usize, Vec<f64>)> = None;
    let max_subdivision = expected_peaks.saturating_sub(1).max(1);
    for subdivision in 1..=max_subdivision {
        let spacing = median / subdivision as f64;
        if spacing < 2.0 {
            break;
        }
        let tolerance = spacing * config.allowed_deviation;
        let phase = anchor.rem_euclid(spacing);
        let k_lo = ((first - phase - tolerance) / spacing).floor() as i64;
        let k_hi = ((last - phase + tolerance) / spacing).ceil() as i64;
        for k in k_lo..=k_hi {
            let base = phase + k as f64 * spacing;
            if base < -tolerance {
                continue;
            }
            let (slots, matched) =
                match_slots(centroids, base, spacing, tolerance, expected_peaks);
            let better = match &best {
                None => matched > 0,
                Some((best_matched, best_sub, _)) => {
                    matched > *best_matched || (matched == *best_matched && subdivision > *best_sub)
                }
            };
            if better {
                best = Some((matched, subdivision, slots));
            }
        }
    }

    match best {
        Some((_, _, slots)) => slots,
        None => {
            log::warn!("no grid placement matched any peak candidate");
            vec![MISSING_PEAK; expected_peaks]
        }
    }
}

/// Greedily match centroids to slots `base + i * spacing`, nearest first,
/// consuming each centroid at most once.
fn match_slots(
    centroids: &[f64],
    base: f64,
    spacing: f64,
    tolerance: f64,
    expected_peaks: usize,
) -> (Vec<f64>, usize) {
    let mut used = vec![false; centroids.len()];
    let mut slots = Vec::with_capacity(expected_peaks);
    let mut matched = 0;
    for slot in 0..expected_peaks {
        let target = base + slot as f64 * spacing;
        let mut found: Option<(usize, f64)> = None;
        for (ci, &c) in centroids.iter().enumerate() {
            if used[ci] {
                continue;
            }
            let dist = (c - target).abs();
            if dist <= tolerance && found.map_or(true, |(_, d)| dist < d) {
                found = Some((ci, dist));
            }
        }
        match found {
            Some((ci, _)) => {
                used[ci] = true;
                matched += 1;
                slots.push(centroids[ci]);
            }
            None => slots.push(MISSING_PEAK),
        }
    }
    (slots, matched)
}

fn fill_in_order(centroids: &[f64], expected_peaks: usize) -> Vec<f64> {
    (0..expected_peaks)
        .map(|i| centroids.get(i).copied().unwrap_or(MISSING_PEAK))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Synthetic trace of Gaussian bumps over a flat baseline with uniform
    /// noise, mirroring what a sensor records as the sweep line crosses it.
    fn bump_trace(
        len: usize,
        centers: &[f64],
        amplitude: f64,
        width: f64,
        baseline: i32,
        noise: i32,
        seed: u64,
    ) -> Vec<i32> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let sigma = width / 2.355;
        (0..len)
            .map(|i| {
                let signal: f64 = centers
                    .iter()
                    .map(|c| {
                        let d = i as f64 - c;
                        amplitude * (-d * d / (2.0 * sigma * sigma)).exp()
                    })
                    .sum();
                let n = if noise > 0 {
                    rng.gen_range(-noise..=noise)
                } else {
                    0
                };
                baseline + signal.round() as i32 + n
            })
            .collect()
    }

    #[test]
    fn test_constant_trace_yields_sentinels() {
        let flat = vec![50; 200];
        let result = extract(&flat, 10, 10, 3, &PeakConfig::default()).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|&v| is_missing(v)));

        let zeros = vec![0; 200];
        let result = extract(&zeros, 10, 10, 3, &PeakConfig::default()).unwrap();
        assert!(result.iter().all(|&v| is_missing(v)));
    }

    #[test]
    fn test_three_even_bumps_resolve_within_one_sample() {
        let trace = bump_trace(110, &[20.0, 55.0, 90.0], 120.0, 10.0, 40, 2, 7);
        let result = extract(&trace, 10, 10, 3, &PeakConfig::default()).unwrap();

        assert_eq!(result.len(), 3);
        for (slot, truth) in result.iter().zip([20.0, 55.0, 90.0]) {
            assert_abs_diff_eq!(*slot, truth, epsilon = 1.0);
        }
        assert!(result.windows(2).all(|w| w[0] < w[1]), "ascending order");
    }

    #[test]
    fn test_missing_middle_bump_leaves_exactly_that_slot() {
        let trace = bump_trace(110, &[20.0, 90.0], 120.0, 10.0, 40, 2, 7);
        let result = extract(&trace, 10, 10, 3, &PeakConfig::default()).unwrap();

        assert_abs_diff_eq!(result[0], 20.0, epsilon = 1.0);
        assert!(is_missing(result[1]), "middle slot must be the sentinel");
        assert_abs_diff_eq!(result[2], 90.0, epsilon = 1.0);
    }

    #[test]
    fn test_baseline_offset_does_not_move_peaks() {
        let trace = bump_trace(110, &[20.0, 55.0, 90.0], 120.0, 10.0, 40, 2, 13);
        let offset: Vec<i32> = trace.iter().map(|v| v + 500).collect();

        let a = extract(&trace, 10, 10, 3, &PeakConfig::default()).unwrap();
        let b = extract(&offset, 10, 10, 3, &PeakConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_is_idempotent() {
        let trace = bump_trace(150, &[30.0, 75.0, 120.0], 200.0, 8.0, 25, 2, 99);
        let a = extract(&trace, 10, 12, 3, &PeakConfig::default()).unwrap();
        let b = extract(&trace, 10, 12, 3, &PeakConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_trace_is_a_configuration_error() {
        let trace = vec![0, 5, 0, 5, 0];
        let err = extract(&trace, 10, 20, 3, &PeakConfig::default()).unwrap_err();
        assert_eq!(
            err,
            CalibError::InsufficientDataForWindow {
                len: 5,
                min_peak_freq: 20
            }
        );
    }

    #[test]
    fn test_amplitude_threshold_is_strict() {
        // Step standing exactly min_amplitude above both window edges: the
        // strict comparison must reject every index.
        let mut step = vec![0; 15];
        for v in step.iter_mut().take(10).skip(5) {
            *v = 10;
        }
        assert!(candidate_indices(&step, 10, 5).is_empty());

        // One count higher qualifies the whole step.
        for v in step.iter_mut().take(10).skip(5) {
            *v = 11;
        }
        assert_eq!(candidate_indices(&step, 10, 5), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_more_slots_than_bumps_pads_with_sentinels() {
        let trace = bump_trace(110, &[20.0, 55.0], 120.0, 10.0, 40, 0, 1);
        let result = extract(&trace, 10, 10, 4, &PeakConfig::default()).unwrap();

        assert_eq!(result.len(), 4);
        let resolved: Vec<f64> = result.iter().copied().filter(|&v| !is_missing(v)).collect();
        assert_eq!(resolved.len(), 2);
        assert_abs_diff_eq!(resolved[0], 20.0, epsilon = 1.0);
        assert_abs_diff_eq!(resolved[1], 55.0, epsilon = 1.0);
    }

    #[test]
    fn test_isolated_noise_spike_is_discarded() {
        // A single-sample spike cannot form a cluster of the minimum size.
        let mut trace = bump_trace(110, &[40.0, 80.0], 120.0, 10.0, 40, 0, 3);
        trace[5] = 400;
        let result = extract(&trace, 10, 10, 2, &PeakConfig::default()).unwrap();

        assert_abs_diff_eq!(result[0], 40.0, epsilon = 1.0);
        assert_abs_diff_eq!(result[1], 80.0, epsilon = 1.0);
    }

    #[test]
    fn test_zero_expected_peaks_returns_empty() {
        let trace = bump_trace(110, &[20.0], 120.0, 10.0, 40, 0, 1);
        let result = extract(&trace, 10, 10, 0, &PeakConfig::default()).unwrap();
        assert!(result.is_empty());
    }
}
