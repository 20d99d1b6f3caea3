//! Append-only per-sensor sample logs and the sensor grid that owns them.

use ndarray::Array2;

use crate::error::CalibError;

/// Append-only log of one sensor's raw readings during a sweep.
///
/// Three parallel sequences (intensity, sweep coordinate, timestamp) that are
/// equal-length at all times; indices correspond 1:1 and insertion order is
/// time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorRecord {
    samples: Vec<i32>,
    sweep_stamps: Vec<f64>,
    timestamps: Vec<f64>,
}

impl SensorRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reading stamped with the sweep coordinate and time at
    /// which it was taken. O(1) amortized.
    pub fn add_sample(&mut self, intensity: i32, sweep_position: f64, timestamp: f64) {
        self.samples.push(intensity);
        self.sweep_stamps.push(sweep_position);
        self.timestamps.push(timestamp);
    }

    /// Number of samples recorded so far.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw intensity at `index`.
    ///
    /// Fails with [`CalibError::SampleOutOfRange`] on overrun; out-of-range
    /// reads never default to zero.
    pub fn sample_at(&self, index: usize) -> Result<i32, CalibError> {
        self.samples
            .get(index)
            .copied()
            .ok_or(CalibError::SampleOutOfRange {
                index,
                len: self.samples.len(),
            })
    }

    /// Sweep coordinate stamped on the sample at `index`.
    pub fn sweep_stamp_at(&self, index: usize) -> Result<f64, CalibError> {
        self.sweep_stamps
            .get(index)
            .copied()
            .ok_or(CalibError::SampleOutOfRange {
                index,
                len: self.sweep_stamps.len(),
            })
    }

    /// Timestamp of the sample at `index`.
    pub fn time_at(&self, index: usize) -> Result<f64, CalibError> {
        self.timestamps
            .get(index)
            .copied()
            .ok_or(CalibError::SampleOutOfRange {
                index,
                len: self.timestamps.len(),
            })
    }

    /// Most recent intensity, if any sample has been recorded.
    pub fn latest_sample(&self) -> Option<i32> {
        self.samples.last().copied()
    }

    /// Full intensity sequence, oldest first.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Sweep coordinate at a fractional sample index, linearly interpolated
    /// between the two bracketing samples and clamped to the record's ends.
    ///
    /// Used to convert a sub-sample peak position into the sweep coordinate
    /// the stimulus occupied when the peak was observed.
    pub fn stamp_at_fractional(&self, position: f64) -> Result<f64, CalibError> {
        if self.sweep_stamps.is_empty() {
            return Err(CalibError::SampleOutOfRange {
                index: 0,
                len: 0,
            });
        }
        let last = self.sweep_stamps.len() - 1;
        let clamped = position.clamp(0.0, last as f64);
        let lo = clamped.floor() as usize;
        let hi = (lo + 1).min(last);
        let frac = clamped - lo as f64;
        Ok(self.sweep_stamps[lo] * (1.0 - frac) + self.sweep_stamps[hi] * frac)
    }

    /// Discard all samples, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.sweep_stamps.clear();
        self.timestamps.clear();
    }
}

/// Fixed-size array of sensor records, one per physical sensor.
///
/// Row-major `[y, x]` layout; the flat reading index for sensor `(x, y)` is
/// `y * x_count + x`.
#[derive(Debug, Clone)]
pub struct SensorGrid {
    records: Array2<SensorRecord>,
}

impl SensorGrid {
    /// Create a grid of empty records.
    pub fn new(x_count: usize, y_count: usize) -> Self {
        Self {
            records: Array2::from_elem((y_count, x_count), SensorRecord::new()),
        }
    }

    /// Sensor columns.
    pub fn x_count(&self) -> usize {
        self.records.dim().1
    }

    /// Sensor rows.
    pub fn y_count(&self) -> usize {
        self.records.dim().0
    }

    /// Record for sensor `(x, y)`.
    ///
    /// Out-of-range access is a caller contract violation and fails with
    /// [`CalibError::IndexOutOfBounds`]; it is never clamped.
    pub fn record(&self, x: usize, y: usize) -> Result<&SensorRecord, CalibError> {
        self.check_bounds(x, y)?;
        Ok(&self.records[[y, x]])
    }

    /// Mutable record for sensor `(x, y)`.
    pub fn record_mut(&mut self, x: usize, y: usize) -> Result<&mut SensorRecord, CalibError> {
        self.check_bounds(x, y)?;
        Ok(&mut self.records[[y, x]])
    }

    /// Mutable record by flat reading index (`y * x_count + x`).
    ///
    /// Panics on out-of-range index; ingestion validates the reading count
    /// before any write.
    pub(crate) fn record_at_flat_mut(&mut self, index: usize) -> &mut SensorRecord {
        let x_count = self.x_count();
        &mut self.records[[index / x_count, index % x_count]]
    }

    /// Iterate records with their `(x, y)` sensor coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &SensorRecord)> {
        self.records
            .indexed_iter()
            .map(|((y, x), rec)| (x, y, rec))
    }

    /// True if any record holds a sample above `threshold`.
    pub fn any_latest_above(&self, threshold: i32) -> bool {
        self.records
            .iter()
            .any(|rec| rec.latest_sample().is_some_and(|s| s > threshold))
    }

    /// Empty every record in place.
    pub fn clear_all(&mut self) {
        for rec in self.records.iter_mut() {
            rec.clear();
        }
    }

    fn check_bounds(&self, x: usize, y: usize) -> Result<(), CalibError> {
        if x >= self.x_count() || y >= self.y_count() {
            return Err(CalibError::IndexOutOfBounds {
                x,
                y,
                x_count: self.x_count(),
                y_count: self.y_count(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parallel_sequences_stay_in_step() {
        let mut rec = SensorRecord::new();
        rec.add_sample(100, 0.5, 1.0);
        rec.add_sample(200, 0.4, 2.0);

        assert_eq!(rec.len(), 2);
        assert_eq!(rec.sample_at(1).unwrap(), 200);
        assert_abs_diff_eq!(rec.sweep_stamp_at(1).unwrap(), 0.4);
        assert_abs_diff_eq!(rec.time_at(0).unwrap(), 1.0);
    }

    #[test]
    fn test_out_of_range_read_fails_loudly() {
        let mut rec = SensorRecord::new();
        rec.add_sample(1, 0.0, 0.0);

        // Overrun must be an error, not a silent zero.
        assert_eq!(
            rec.sample_at(1),
            Err(CalibError::SampleOutOfRange { index: 1, len: 1 })
        );
        assert!(rec.sweep_stamp_at(7).is_err());
        assert!(rec.time_at(7).is_err());
    }

    #[test]
    fn test_fractional_stamp_interpolates_and_clamps() {
        let mut rec = SensorRecord::new();
        rec.add_sample(0, 1.0, 0.0);
        rec.add_sample(0, 0.8, 0.1);
        rec.add_sample(0, 0.6, 0.2);

        assert_abs_diff_eq!(rec.stamp_at_fractional(0.5).unwrap(), 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(rec.stamp_at_fractional(2.0).unwrap(), 0.6, epsilon = 1e-12);
        // Past the last sample clamps to the final stamp.
        assert_abs_diff_eq!(rec.stamp_at_fractional(9.0).unwrap(), 0.6, epsilon = 1e-12);
        assert!(SensorRecord::new().stamp_at_fractional(0.0).is_err());
    }

    #[test]
    fn test_grid_bounds_are_enforced() {
        let grid = SensorGrid::new(3, 2);
        assert!(grid.record(2, 1).is_ok());
        assert_eq!(
            grid.record(3, 0),
            Err(CalibError::IndexOutOfBounds {
                x: 3,
                y: 0,
                x_count: 3,
                y_count: 2
            })
        );
        assert!(grid.record(0, 2).is_err());
    }

    #[test]
    fn test_flat_index_matches_row_major_convention() {
        let mut grid = SensorGrid::new(3, 2);
        // Flat index 4 = y=1, x=1.
        grid.record_at_flat_mut(4).add_sample(42, 0.0, 0.0);
        assert_eq!(grid.record(1, 1).unwrap().latest_sample(), Some(42));
        assert!(grid.record(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_clear_all_empties_every_record() {
        let mut grid = SensorGrid::new(2, 2);
        for i in 0..4 {
            grid.record_at_flat_mut(i).add_sample(1, 0.0, 0.0);
        }
        grid.clear_all();
        assert!(grid.iter().all(|(_, _, rec)| rec.is_empty()));
    }
}
