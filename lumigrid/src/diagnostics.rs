//! Optional trace diagnostics.
//!
//! Raw per-sensor traces are only interesting when tuning peak extraction, so
//! dumping them is an injected capability rather than a core responsibility:
//! install a [`TraceSink`] on the calibrator to receive every record at axis
//! completion, or install none and pay nothing.

use std::io::Write;

use crate::display::SweepAxis;
use crate::error::CalibError;
use crate::record::SensorRecord;

/// Receiver for completed per-sensor traces.
pub trait TraceSink {
    /// Called once per sensor when a sweep axis completes, before the records
    /// are cleared for the next axis.
    fn record_trace(
        &mut self,
        sensor_x: usize,
        sensor_y: usize,
        axis: SweepAxis,
        record: &SensorRecord,
    );
}

/// CSV sink writing one row per sample.
///
/// Columns: `sensor_x, sensor_y, axis, index, intensity, sweep_stamp,
/// timestamp`.
pub struct CsvTraceSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvTraceSink<W> {
    pub fn new(inner: W) -> Result<Self, csv::Error> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record([
            "sensor_x",
            "sensor_y",
            "axis",
            "index",
            "intensity",
            "sweep_stamp",
            "timestamp",
        ])?;
        Ok(Self { writer })
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write> TraceSink for CsvTraceSink<W> {
    fn record_trace(
        &mut self,
        sensor_x: usize,
        sensor_y: usize,
        axis: SweepAxis,
        record: &SensorRecord,
    ) {
        let axis_label = match axis {
            SweepAxis::Horizontal => "horizontal",
            SweepAxis::Vertical => "vertical",
        };
        for i in 0..record.len() {
            // In-range by construction; accessor errors would indicate a
            // record mutated mid-dump.
            let row: Result<(i32, f64, f64), CalibError> = (|| {
                Ok((
                    record.sample_at(i)?,
                    record.sweep_stamp_at(i)?,
                    record.time_at(i)?,
                ))
            })();
            let Ok((intensity, stamp, time)) = row else {
                log::warn!("trace row {i} for sensor ({sensor_x}, {sensor_y}) unavailable");
                continue;
            };
            if let Err(e) = self.writer.write_record([
                sensor_x.to_string(),
                sensor_y.to_string(),
                axis_label.to_string(),
                i.to_string(),
                intensity.to_string(),
                stamp.to_string(),
                time.to_string(),
            ]) {
                log::warn!("failed to write trace row: {e}");
                return;
            }
        }
    }
}
