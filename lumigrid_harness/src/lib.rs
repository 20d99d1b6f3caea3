//! Simulation harness for sweep calibration.
//!
//! Provides a synthetic sensor array with known display positions and a
//! display stub, so the full calibration loop can run without hardware.
//!
//! NOTE: the optical model is NOT intended to be physically accurate. It only
//! exists to ensure the calibration loop coarsely works end to end: each
//! sensor responds with a Gaussian pulse as the sweep line crosses its
//! position, offset per display slice, over a noisy baseline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lumigrid::display::{DisplayLink, FillRegion, ScenePoint, SweepAxis};
use lumigrid::Calibrator;

/// Configuration for the synthetic sensor array.
#[derive(Debug, Clone)]
pub struct SensorArrayConfig {
    /// Sensor columns.
    pub x_count: usize,
    /// Sensor rows.
    pub y_count: usize,
    /// Display slices; each adds one response pulse per sweep.
    pub slice_count: usize,
    /// Normalized spacing between adjacent sensors (grid is centered).
    pub sensor_spacing: f64,
    /// Normalized diagonal displacement between adjacent slices.
    pub slice_spacing: f64,
    /// Peak response above baseline, in raw counts.
    pub amplitude: f64,
    /// Dark reading level.
    pub baseline: i32,
    /// Uniform noise half-range in raw counts.
    pub noise: i32,
    /// FWHM of the response pulse in normalized display units.
    pub response_width: f64,
    /// RNG seed for reproducible noise.
    pub seed: u64,
}

impl Default for SensorArrayConfig {
    fn default() -> Self {
        Self {
            x_count: 3,
            y_count: 3,
            slice_count: 3,
            sensor_spacing: 0.25,
            slice_spacing: 0.08,
            amplitude: 120.0,
            baseline: 40,
            noise: 2,
            response_width: 0.025,
            seed: 42,
        }
    }
}

/// Synthetic LED sensor array watching the display.
pub struct SensorArraySim {
    config: SensorArrayConfig,
    rng: ChaCha8Rng,
    dead_sensors: HashSet<(usize, usize)>,
    dropped_slices: HashSet<(usize, usize, usize)>,
}

impl SensorArraySim {
    pub fn new(config: SensorArrayConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            dead_sensors: HashSet::new(),
            dropped_slices: HashSet::new(),
        }
    }

    /// Mark a sensor as disconnected: it reads baseline noise only.
    pub fn kill_sensor(&mut self, x: usize, y: usize) {
        self.dead_sensors.insert((x, y));
    }

    /// Suppress one sensor's response to a single slice.
    pub fn drop_slice(&mut self, x: usize, y: usize, slice: usize) {
        self.dropped_slices.insert((x, y, slice));
    }

    pub fn config(&self) -> &SensorArrayConfig {
        &self.config
    }

    /// Normalized display position of sensor `(x, y)`, centered grid.
    pub fn sensor_position(&self, x: usize, y: usize) -> (f64, f64) {
        let half_x = (self.config.x_count - 1) as f64 / 2.0;
        let half_y = (self.config.y_count - 1) as f64 / 2.0;
        (
            0.5 + (x as f64 - half_x) * self.config.sensor_spacing,
            0.5 + (y as f64 - half_y) * self.config.sensor_spacing,
        )
    }

    /// Normalized offset of a slice's projection.
    ///
    /// Slices are stacked diagonally and indexed in sweep-crossing order:
    /// slice 0 projects furthest toward the display's far corner, so a sweep
    /// descending from the far edge reaches it first on both axes.
    pub fn slice_offset(&self, slice: usize) -> f64 {
        let mid = (self.config.slice_count - 1) as f64 / 2.0;
        (mid - slice as f64) * self.config.slice_spacing
    }

    /// True calibrated coordinate of `(sensor, slice)` along `axis`.
    pub fn true_position(&self, x: usize, y: usize, slice: usize, axis: SweepAxis) -> f64 {
        let (px, py) = self.sensor_position(x, y);
        let base = match axis {
            SweepAxis::Horizontal => py,
            SweepAxis::Vertical => px,
        };
        base + self.slice_offset(slice)
    }

    /// One cycle of raw readings given the line currently on the display.
    ///
    /// Flat-indexed `y * x_count + x`, as the hardware reports them.
    pub fn readings(&mut self, line: Option<(SweepAxis, f64, f64)>) -> Vec<i32> {
        let sigma = self.config.response_width / 2.355;
        let mut out = Vec::with_capacity(self.config.x_count * self.config.y_count);
        for y in 0..self.config.y_count {
            for x in 0..self.config.x_count {
                let mut signal = 0.0;
                if let (Some((axis, position, thickness)), false) =
                    (line, self.dead_sensors.contains(&(x, y)))
                {
                    let centerline = position + thickness / 2.0;
                    for slice in 0..self.config.slice_count {
                        if self.dropped_slices.contains(&(x, y, slice)) {
                            continue;
                        }
                        let target = self.true_position(x, y, slice, axis);
                        let d = centerline - target;
                        signal += self.config.amplitude * (-d * d / (2.0 * sigma * sigma)).exp();
                    }
                }
                let noise = if self.config.noise > 0 {
                    self.rng.gen_range(-self.config.noise..=self.config.noise)
                } else {
                    0
                };
                out.push(self.config.baseline + signal.round() as i32 + noise);
            }
        }
        out
    }
}

/// State the simulated display was last commanded into.
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    pub line: Option<(SweepAxis, f64, f64)>,
    pub fill: Option<FillRegion>,
}

/// Display stub with shared state, so the simulation can read back what the
/// calibrator commanded.
#[derive(Clone)]
pub struct SimDisplay {
    state: Arc<Mutex<DisplayState>>,
    /// Scene width in pixels used by the normalized-to-scene mapping.
    pub width: f64,
    /// Scene height in pixels.
    pub height: f64,
}

impl Default for SimDisplay {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState::default())),
            width: 2560.0,
            height: 2560.0,
        }
    }
}

impl SimDisplay {
    pub fn state(&self) -> DisplayState {
        self.state.lock().unwrap().clone()
    }
}

impl DisplayLink for SimDisplay {
    fn set_line_sweep_position(&mut self, axis: SweepAxis, position: f64, thickness: f64) {
        self.state.lock().unwrap().line = Some((axis, position, thickness));
    }

    fn set_fill_region(&mut self, region: FillRegion) {
        self.state.lock().unwrap().fill = Some(region);
    }

    fn map_normalized_to_scene(&self, x: f64, y: f64) -> ScenePoint {
        ScenePoint {
            x: x * self.width,
            y: y * self.height,
        }
    }
}

/// Drive the calibrator until it returns to idle, feeding it simulated
/// readings each cycle.
///
/// Returns the number of cycles processed. Panics if the run exceeds
/// `max_cycles` (a runaway sweep is a bug, not a slow run).
pub fn run_to_idle(
    calibrator: &mut Calibrator<SimDisplay>,
    display: &SimDisplay,
    sim: &mut SensorArraySim,
    max_cycles: usize,
) -> usize {
    let mut cycles = 0;
    while calibrator.state() != lumigrid::SweepState::Idle {
        let line = display.state().line;
        let readings = sim.readings(line);
        calibrator
            .ingest_cycle(&readings)
            .expect("simulated readings always match the grid");
        cycles += 1;
        assert!(cycles < max_cycles, "calibration did not terminate");
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sensor_grid_is_centered() {
        let sim = SensorArraySim::new(SensorArrayConfig::default());
        assert_eq!(sim.sensor_position(1, 1), (0.5, 0.5));
        assert_eq!(sim.sensor_position(0, 0), (0.25, 0.25));
        assert_eq!(sim.sensor_position(2, 2), (0.75, 0.75));
    }

    #[test]
    fn test_slices_are_indexed_in_crossing_order() {
        let sim = SensorArraySim::new(SensorArrayConfig::default());
        // Slice 0 projects furthest toward the far edge.
        assert!(sim.slice_offset(0) > sim.slice_offset(1));
        assert!(sim.slice_offset(1) > sim.slice_offset(2));
        assert_abs_diff_eq!(sim.slice_offset(1), 0.0);
    }

    #[test]
    fn test_readings_peak_when_line_crosses_sensor() {
        let mut sim = SensorArraySim::new(SensorArrayConfig {
            noise: 0,
            slice_count: 1,
            ..SensorArrayConfig::default()
        });
        let far = sim.readings(Some((SweepAxis::Horizontal, 0.95, 0.0)));
        // Line over the middle row: centerline 0.5 = row 1's position.
        let near = sim.readings(Some((SweepAxis::Horizontal, 0.5, 0.0)));

        // Flat index 4 = middle sensor (x=1, y=1).
        assert_eq!(far[4], 40);
        assert_eq!(near[4], 160);
    }

    #[test]
    fn test_dead_sensor_reads_baseline() {
        let mut sim = SensorArraySim::new(SensorArrayConfig {
            noise: 0,
            ..SensorArrayConfig::default()
        });
        sim.kill_sensor(1, 1);
        let readings = sim.readings(Some((SweepAxis::Horizontal, 0.5, 0.0)));
        assert_eq!(readings[4], 40);
        // A live sensor in the same row still responds.
        assert!(readings[3] > 40);
    }
}
