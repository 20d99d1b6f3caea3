//! Calibration modules: the polymorphic states driven by the calibrator.
//!
//! A module owns the stimulus it is sweeping (line position, fill rectangle)
//! and is stepped once per ingestion cycle. The calibrator installs one
//! module at a time and holds it by value; during a cycle the module sees the
//! rest of the system only through [`CycleContext`], never a back-reference.

use serde::{Deserialize, Serialize};

use crate::callback::{CalibrationEvent, EventRegistry};
use crate::config::{BoundsSearchConfig, CalibratorConfig, SweepConfig};
use crate::diagnostics::TraceSink;
use crate::display::{DisplayLink, FillRegion, SweepAxis};
use crate::error::CalibError;
use crate::peaks;
use crate::record::SensorGrid;
use crate::table::PositionTable;

/// Externally observable calibration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    /// No module installed.
    Idle,
    /// A line sweep is traversing the given axis.
    Sweeping { axis: SweepAxis },
    /// Both axes done; final output is being computed.
    Resolving,
    /// A bounds search is halving its rectangle.
    Searching,
}

/// Whether a module wants to keep receiving cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOutcome {
    Running,
    Finished,
}

/// Borrowed view of the calibrator a module works against for one cycle.
pub(crate) struct CycleContext<'a, L: DisplayLink> {
    pub grid: &'a mut SensorGrid,
    pub table: &'a mut PositionTable,
    pub config: &'a CalibratorConfig,
    pub link: &'a mut L,
    pub sink: &'a mut Option<Box<dyn TraceSink>>,
    pub events: &'a EventRegistry,
}

/// The calibration procedures available to the calibrator.
pub enum CalibrationModule {
    /// Two-axis line sweep resolving per-slice sensor positions.
    LineSweep(LineSweepModule),
    /// Halving search locating the display region a sensor responds to.
    BoundsSearch(BoundsSearchModule),
}

impl CalibrationModule {
    /// Line sweep with the given motion parameters.
    pub fn line_sweep(config: SweepConfig) -> Self {
        CalibrationModule::LineSweep(LineSweepModule::new(config))
    }

    /// Bounds search with the given halving parameters.
    pub fn bounds_search(config: BoundsSearchConfig) -> Self {
        CalibrationModule::BoundsSearch(BoundsSearchModule::new(config))
    }

    /// Instantaneous sweep coordinate stamped onto ingested samples.
    pub fn current_sweep_value(&self) -> f64 {
        match self {
            CalibrationModule::LineSweep(m) => m.current_sweep_value(),
            CalibrationModule::BoundsSearch(m) => m.current_sweep_value(),
        }
    }

    /// State reported while this module is installed.
    pub fn state(&self) -> SweepState {
        match self {
            CalibrationModule::LineSweep(m) => m.state(),
            CalibrationModule::BoundsSearch(_) => SweepState::Searching,
        }
    }

    pub(crate) fn start<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        match self {
            CalibrationModule::LineSweep(m) => m.start(cx),
            CalibrationModule::BoundsSearch(m) => m.start(cx),
        }
    }

    pub(crate) fn update<L: DisplayLink>(
        &mut self,
        cx: &mut CycleContext<'_, L>,
    ) -> Result<ModuleOutcome, CalibError> {
        match self {
            CalibrationModule::LineSweep(m) => m.update(cx),
            CalibrationModule::BoundsSearch(m) => Ok(m.update(cx)),
        }
    }

    pub(crate) fn end<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        match self {
            CalibrationModule::LineSweep(m) => m.end(cx),
            CalibrationModule::BoundsSearch(m) => m.end(cx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineSweepPhase {
    Sweeping(SweepAxis),
    Resolving,
}

/// Constant-speed line sweep over both display axes.
///
/// The line enters with its centerline just past the far edge and advances
/// toward (and below) zero each cycle; crossing zero completes the axis. The
/// horizontal pass runs first, then the vertical, then the module resolves
/// the position table into scene coordinates and detaches.
///
/// Sensor records are cleared at the start of each axis, so every extraction
/// runs over exactly the samples of the axis being resolved.
pub struct LineSweepModule {
    config: SweepConfig,
    phase: LineSweepPhase,
    position: f64,
}

impl LineSweepModule {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            config,
            phase: LineSweepPhase::Sweeping(SweepAxis::Horizontal),
            position: 1.0,
        }
    }

    /// Centerline of the sweep line, the coordinate correlated with sensor
    /// readings.
    pub fn current_sweep_value(&self) -> f64 {
        self.position + self.config.thickness / 2.0
    }

    fn state(&self) -> SweepState {
        match self.phase {
            LineSweepPhase::Sweeping(axis) => SweepState::Sweeping { axis },
            LineSweepPhase::Resolving => SweepState::Resolving,
        }
    }

    fn start<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        self.phase = LineSweepPhase::Sweeping(SweepAxis::Horizontal);
        cx.table.clear();
        self.begin_axis(cx, SweepAxis::Horizontal);
    }

    fn begin_axis<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>, axis: SweepAxis) {
        self.position = 1.0;
        cx.grid.clear_all();
        log::info!("starting {axis:?} sweep at speed {}", self.config.speed);
        cx.events.emit(&CalibrationEvent::SweepStarted { axis });
        cx.link
            .set_line_sweep_position(axis, self.position, self.config.thickness);
    }

    fn update<L: DisplayLink>(
        &mut self,
        cx: &mut CycleContext<'_, L>,
    ) -> Result<ModuleOutcome, CalibError> {
        let LineSweepPhase::Sweeping(axis) = self.phase else {
            return Ok(ModuleOutcome::Finished);
        };

        self.position -= self.config.speed;
        if self.current_sweep_value() < 0.0 {
            self.resolve_axis(cx, axis)?;
            return match axis.next() {
                Some(next) => {
                    self.phase = LineSweepPhase::Sweeping(next);
                    self.begin_axis(cx, next);
                    Ok(ModuleOutcome::Running)
                }
                None => {
                    self.phase = LineSweepPhase::Resolving;
                    Ok(ModuleOutcome::Finished)
                }
            };
        }

        cx.link
            .set_line_sweep_position(axis, self.position, self.config.thickness);
        Ok(ModuleOutcome::Running)
    }

    /// Resolve every sensor's record for the axis just swept and write the
    /// corresponding coordinate into the position table.
    fn resolve_axis<L: DisplayLink>(
        &self,
        cx: &mut CycleContext<'_, L>,
        axis: SweepAxis,
    ) -> Result<(), CalibError> {
        let cfg = cx.config;
        let mut matched = 0;
        let mut missing = 0;
        for y in 0..cfg.y_count {
            for x in 0..cfg.x_count {
                let slots = {
                    let record = cx.grid.record(x, y)?;
                    if let Some(sink) = cx.sink.as_deref_mut() {
                        sink.record_trace(x, y, axis, record);
                    }
                    peaks::extract(
                        record.samples(),
                        cfg.min_peak_amplitude,
                        cfg.min_peak_freq,
                        cfg.slice_count,
                        &cfg.peak,
                    )?
                };
                for (slice, slot) in slots.iter().enumerate() {
                    if peaks::is_missing(*slot) {
                        missing += 1;
                        continue;
                    }
                    let coord = cx.grid.record(x, y)?.stamp_at_fractional(*slot)?;
                    cx.table.set_axis(x, y, slice, axis, coord)?;
                    matched += 1;
                }
            }
        }

        log::info!("{axis:?} sweep complete: {matched} peaks matched, {missing} missing");
        cx.events.emit(&CalibrationEvent::AxisCompleted {
            axis,
            matched,
            missing,
        });
        Ok(())
    }

    /// Map every fully calibrated point into the scene and notify observers.
    ///
    /// Runs exactly once, on completion or cancellation alike.
    fn end<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        let slice_count = cx.table.slice_count();
        for (x, y, slice, point) in cx.table.iter() {
            let (Some(px), Some(py)) = (point.x, point.y) else {
                log::debug!("point ({x}, {y}, slice {slice}) incomplete; no indicator placed");
                continue;
            };
            let position = cx.link.map_normalized_to_scene(px, py);
            let depth = if slice_count > 1 {
                slice as f64 / (slice_count - 1) as f64
            } else {
                0.5
            };
            cx.events.emit(&CalibrationEvent::IndicatorPlaced {
                sensor_x: x,
                sensor_y: y,
                slice,
                position,
                depth,
            });
        }

        let (fully_calibrated, total) = cx.table.completion();
        log::info!("line sweep ended: {fully_calibrated}/{total} points fully calibrated");
        cx.events.emit(&CalibrationEvent::CalibrationComplete {
            fully_calibrated,
            total,
        });
    }
}

/// Halving search for the display region a sensor responds to.
///
/// Lights a rectangle, watches whether any sensor still sees it, and
/// repeatedly keeps the responsive half, alternating the split axis. The
/// search converges on the smallest rectangle that still draws a response.
pub struct BoundsSearchModule {
    config: BoundsSearchConfig,
    current: FillRegion,
    last_successful: FillRegion,
    halving_width: bool,
    first_half: bool,
}

impl BoundsSearchModule {
    pub fn new(config: BoundsSearchConfig) -> Self {
        Self {
            config,
            current: FillRegion::FULL,
            last_successful: FillRegion::FULL,
            halving_width: false,
            first_half: false,
        }
    }

    /// Rectangle center along the axis currently being halved.
    pub fn current_sweep_value(&self) -> f64 {
        let axis = if self.halving_width {
            SweepAxis::Vertical
        } else {
            SweepAxis::Horizontal
        };
        self.current.center_along(axis)
    }

    fn start<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        self.current = FillRegion::FULL;
        self.last_successful = FillRegion::FULL;
        self.halving_width = false;
        self.first_half = false;
        cx.grid.clear_all();
        log::info!(
            "starting bounds search (hit threshold {})",
            self.config.hit_threshold
        );
        cx.link.set_fill_region(self.current);
    }

    fn update<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) -> ModuleOutcome {
        let hit = cx.grid.any_latest_above(self.config.hit_threshold);
        if hit {
            self.last_successful = self.current;
            self.halving_width = !self.halving_width;
            if self.halving_width {
                self.current.width /= 2.0;
                if self.first_half {
                    self.current.x += self.last_successful.width / 2.0;
                }
            } else {
                self.current.height /= 2.0;
                if self.first_half {
                    self.current.y += self.last_successful.height / 2.0;
                }
            }
        } else {
            // The kept half went dark: try the other half, falling back to
            // the last responsive rectangle if that would leave the display.
            self.first_half = !self.first_half;
            if self.halving_width {
                let delta = self.last_successful.width / 2.0;
                self.current.x += if self.first_half { delta } else { -delta };
            } else {
                let delta = self.last_successful.height / 2.0;
                self.current.y += if self.first_half { delta } else { -delta };
            }
            if !self.current.in_bounds() {
                self.first_half = !self.first_half;
                self.current = self.last_successful;
            }
        }

        if self.current.width < self.config.min_extent
            || self.current.height < self.config.min_extent
        {
            log::info!(
                "bounds search converged on ({:.4}, {:.4}) {:.4}x{:.4}",
                self.last_successful.x,
                self.last_successful.y,
                self.last_successful.width,
                self.last_successful.height
            );
            cx.events.emit(&CalibrationEvent::BoundsLocated {
                region: self.last_successful,
            });
            return ModuleOutcome::Finished;
        }

        cx.link.set_fill_region(self.current);
        ModuleOutcome::Running
    }

    fn end<L: DisplayLink>(&mut self, cx: &mut CycleContext<'_, L>) {
        cx.link.set_fill_region(FillRegion::OFF);
    }
}
