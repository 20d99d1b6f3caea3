//! The calibrated position table filled by the two sweep axes.

use ndarray::Array3;

use crate::display::SweepAxis;
use crate::error::CalibError;

/// One `(sensor, slice)` point under calibration.
///
/// The two coordinates are written independently by the two sweep axes; a
/// point counts as fully calibrated only once both are present. Coordinates
/// are normalized display units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibratedPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl CalibratedPoint {
    /// Both coordinates resolved.
    pub fn is_complete(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }
}

/// 3D-indexed table of calibrated points: `(sensor_x, sensor_y, slice)`.
#[derive(Debug, Clone)]
pub struct PositionTable {
    // Stored [y, x, slice] to match the grid's row-major layout.
    points: Array3<CalibratedPoint>,
}

impl PositionTable {
    pub fn new(x_count: usize, y_count: usize, slice_count: usize) -> Self {
        Self {
            points: Array3::from_elem((y_count, x_count, slice_count), CalibratedPoint::default()),
        }
    }

    pub fn slice_count(&self) -> usize {
        self.points.dim().2
    }

    /// Point for `(sensor_x, sensor_y, slice)`.
    pub fn point(&self, x: usize, y: usize, slice: usize) -> Result<CalibratedPoint, CalibError> {
        self.check_bounds(x, y, slice)?;
        Ok(self.points[[y, x, slice]])
    }

    /// Write the coordinate a sweep along `axis` resolves.
    ///
    /// A horizontal line travels vertically and localizes `y`; a vertical
    /// line localizes `x`.
    pub fn set_axis(
        &mut self,
        x: usize,
        y: usize,
        slice: usize,
        axis: SweepAxis,
        value: f64,
    ) -> Result<(), CalibError> {
        self.check_bounds(x, y, slice)?;
        let point = &mut self.points[[y, x, slice]];
        match axis {
            SweepAxis::Horizontal => point.y = Some(value),
            SweepAxis::Vertical => point.x = Some(value),
        }
        Ok(())
    }

    /// Reset every point to uncalibrated.
    pub fn clear(&mut self) {
        self.points.fill(CalibratedPoint::default());
    }

    /// Iterate points with their `(x, y, slice)` indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize, CalibratedPoint)> + '_ {
        self.points
            .indexed_iter()
            .map(|((y, x, slice), p)| (x, y, slice, *p))
    }

    /// Number of fully calibrated points and the table total.
    pub fn completion(&self) -> (usize, usize) {
        let complete = self.points.iter().filter(|p| p.is_complete()).count();
        (complete, self.points.len())
    }

    fn check_bounds(&self, x: usize, y: usize, slice: usize) -> Result<(), CalibError> {
        let (y_count, x_count, slice_count) = self.points.dim();
        if x >= x_count || y >= y_count || slice >= slice_count {
            return Err(CalibError::IndexOutOfBounds {
                x,
                y,
                x_count,
                y_count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_complete_only_with_both_axes() {
        let mut table = PositionTable::new(2, 2, 3);
        assert!(!table.point(1, 0, 2).unwrap().is_complete());

        table.set_axis(1, 0, 2, SweepAxis::Horizontal, 0.25).unwrap();
        assert!(!table.point(1, 0, 2).unwrap().is_complete());

        table.set_axis(1, 0, 2, SweepAxis::Vertical, 0.75).unwrap();
        let p = table.point(1, 0, 2).unwrap();
        assert!(p.is_complete());
        assert_eq!(p.x, Some(0.75));
        assert_eq!(p.y, Some(0.25));
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let mut table = PositionTable::new(2, 2, 1);
        assert!(table.point(2, 0, 0).is_err());
        assert!(table.set_axis(0, 0, 1, SweepAxis::Vertical, 0.0).is_err());
    }

    #[test]
    fn test_completion_counts() {
        let mut table = PositionTable::new(1, 1, 2);
        assert_eq!(table.completion(), (0, 2));
        table.set_axis(0, 0, 0, SweepAxis::Horizontal, 0.1).unwrap();
        table.set_axis(0, 0, 0, SweepAxis::Vertical, 0.2).unwrap();
        assert_eq!(table.completion(), (1, 2));
        table.clear();
        assert_eq!(table.completion(), (0, 2));
    }
}
