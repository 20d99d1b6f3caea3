//! LUMIGRID - sweep-line calibration for display-mounted optical sensor grids.
//!
//! Drives a moving-line stimulus across a display surface while logging every
//! photosensor's intensity, then resolves each sensor's detected light pulses
//! into normalized display coordinates, one display slice at a time.
//! Calibration proceeds through states:
//! Idle -> Sweeping(Horizontal) -> Sweeping(Vertical) -> Resolving -> Idle

use std::time::Instant;

pub mod callback;
pub mod config;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod module;
pub mod peaks;
pub mod record;
pub mod table;

use crate::callback::EventRegistry;
use crate::module::CycleContext;

// Re-export commonly used types for external use
pub use crate::callback::{CalibrationEvent, CallbackId};
pub use crate::config::CalibratorConfig;
pub use crate::display::{DisplayLink, FillRegion, ScenePoint, SweepAxis};
pub use crate::error::CalibError;
pub use crate::module::{CalibrationModule, ModuleOutcome, SweepState};
pub use crate::peaks::{is_missing, MISSING_PEAK};
pub use crate::record::{SensorGrid, SensorRecord};
pub use crate::table::{CalibratedPoint, PositionTable};

/// Orchestrates sweep calibration over a sensor grid.
///
/// Owns the sensor records, the position table and the active calibration
/// module, and is driven by one external cycle callback: each call to
/// [`ingest_cycle`](Calibrator::ingest_cycle) consumes exactly one reading
/// per sensor and advances the module once. The calibrator is the sole
/// writer of the records; peak extraction only ever reads them.
pub struct Calibrator<L: DisplayLink> {
    config: CalibratorConfig,
    grid: SensorGrid,
    table: PositionTable,
    module: Option<CalibrationModule>,
    link: L,
    sink: Option<Box<dyn diagnostics::TraceSink>>,
    events: EventRegistry,
    started: Instant,
    cycle_count: u64,
}

impl<L: DisplayLink> Calibrator<L> {
    /// Create a calibrator over an `x_count x y_count` sensor grid.
    pub fn new(link: L, config: CalibratorConfig) -> Self {
        let grid = SensorGrid::new(config.x_count, config.y_count);
        let table = PositionTable::new(config.x_count, config.y_count, config.slice_count);
        Self {
            config,
            grid,
            table,
            module: None,
            link,
            sink: None,
            events: EventRegistry::default(),
            started: Instant::now(),
            cycle_count: 0,
        }
    }

    /// Install an optional sink receiving every completed trace.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn diagnostics::TraceSink>>) {
        self.sink = sink;
    }

    /// Register a callback for calibration events.
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&CalibrationEvent) + Send + Sync + 'static,
    {
        self.events.register(callback)
    }

    /// Deregister a callback.
    pub fn deregister_callback(&self, id: CallbackId) -> bool {
        self.events.deregister(id)
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.events.len()
    }

    /// Current calibration state.
    pub fn state(&self) -> SweepState {
        self.module
            .as_ref()
            .map_or(SweepState::Idle, |m| m.state())
    }

    /// The sensor grid (records of the axis currently being swept).
    pub fn grid(&self) -> &SensorGrid {
        &self.grid
    }

    /// The position table filled so far.
    pub fn table(&self) -> &PositionTable {
        &self.table
    }

    /// The display link driven by calibration.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Configuration this calibrator was built with.
    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Install a calibration module, or deactivate calibration with `None`.
    ///
    /// Any active module's `end` hook runs first, so cleanup happens on every
    /// exit path including cancellation; installing while a sweep is mid-run
    /// is legal but logged. The new module's `start` hook runs before the
    /// next cycle.
    pub fn set_active_module(&mut self, module: Option<CalibrationModule>) {
        if let Some(mut old) = self.module.take() {
            if module.is_some() {
                log::warn!("replacing active calibration module mid-run");
            }
            let mut cx = CycleContext {
                grid: &mut self.grid,
                table: &mut self.table,
                config: &self.config,
                link: &mut self.link,
                sink: &mut self.sink,
                events: &self.events,
            };
            old.end(&mut cx);
        }

        if let Some(mut m) = module {
            let mut cx = CycleContext {
                grid: &mut self.grid,
                table: &mut self.table,
                config: &self.config,
                link: &mut self.link,
                sink: &mut self.sink,
                events: &self.events,
            };
            m.start(&mut cx);
            self.module = Some(m);
        }
    }

    /// Ingest one reading per sensor and advance the active module.
    ///
    /// `readings` must hold exactly `x_count * y_count` values, flat-indexed
    /// `y * x_count + x`; any other length fails with
    /// [`CalibError::ShapeMismatch`] before a single record is touched. With
    /// no module active the shape check still runs but the readings are
    /// discarded: there is no sweep coordinate to stamp them with.
    pub fn ingest_cycle(&mut self, readings: &[i32]) -> Result<(), CalibError> {
        let expected = self.config.sensor_count();
        if readings.len() != expected {
            return Err(CalibError::ShapeMismatch {
                expected,
                actual: readings.len(),
            });
        }

        let Some(mut module) = self.module.take() else {
            log::debug!("ingestion cycle with no active module; readings discarded");
            return Ok(());
        };

        let stamp = module.current_sweep_value();
        let now = self.started.elapsed().as_secs_f64();
        for (i, &raw) in readings.iter().enumerate() {
            self.grid.record_at_flat_mut(i).add_sample(raw, stamp, now);
        }
        self.cycle_count += 1;

        let mut cx = CycleContext {
            grid: &mut self.grid,
            table: &mut self.table,
            config: &self.config,
            link: &mut self.link,
            sink: &mut self.sink,
            events: &self.events,
        };
        match module.update(&mut cx) {
            Ok(ModuleOutcome::Running) => {
                self.module = Some(module);
                Ok(())
            }
            Ok(ModuleOutcome::Finished) => {
                module.end(&mut cx);
                Ok(())
            }
            Err(e) => {
                // Leave the module installed so cancellation still runs its
                // end hook.
                self.module = Some(module);
                Err(e)
            }
        }
    }

    /// Total ingestion cycles processed while a module was active.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run peak extraction over one sensor's current record.
    ///
    /// Fails with [`CalibError::IndexOutOfBounds`] for a sensor outside the
    /// grid; extraction tunables come from the configured
    /// [`PeakConfig`](config::PeakConfig).
    pub fn run_peak_extraction(
        &self,
        x: usize,
        y: usize,
        min_amplitude: i32,
        min_peak_freq: usize,
        expected_peaks: usize,
    ) -> Result<Vec<f64>, CalibError> {
        let record = self.grid.record(x, y)?;
        peaks::extract(
            record.samples(),
            min_amplitude,
            min_peak_freq,
            expected_peaks,
            &self.config.peak,
        )
    }
}
