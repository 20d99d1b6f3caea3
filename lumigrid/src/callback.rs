//! Event callbacks emitted by the calibrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::display::{FillRegion, ScenePoint, SweepAxis};

/// Events emitted for external observers.
#[derive(Debug, Clone)]
pub enum CalibrationEvent {
    /// A sweep axis has started moving.
    SweepStarted { axis: SweepAxis },
    /// A sweep axis finished and its records were resolved into positions.
    AxisCompleted {
        axis: SweepAxis,
        /// Peak slots matched across all sensors.
        matched: usize,
        /// Peak slots left at the missing sentinel.
        missing: usize,
    },
    /// A fully calibrated point was mapped into the scene.
    ///
    /// Emitted once per `(sensor, slice)` when the module ends; the host
    /// places its visual indicator marker here.
    IndicatorPlaced {
        sensor_x: usize,
        sensor_y: usize,
        slice: usize,
        position: ScenePoint,
        /// Slice-derived depth in `[0, 1]`.
        depth: f64,
    },
    /// The active module finished and detached.
    CalibrationComplete {
        /// Points with both coordinates resolved.
        fully_calibrated: usize,
        /// Total points in the table.
        total: usize,
    },
    /// The bounds search converged on a rectangle.
    BoundsLocated { region: FillRegion },
}

/// Callback ID for registration/deregistration.
pub type CallbackId = u64;

/// Callback function type.
pub type CalibrationCallback = Arc<dyn Fn(&CalibrationEvent) + Send + Sync>;

/// Registry of event callbacks.
#[derive(Clone, Default)]
pub(crate) struct EventRegistry {
    callbacks: Arc<Mutex<HashMap<CallbackId, CalibrationCallback>>>,
    next_id: Arc<Mutex<CallbackId>>,
}

impl EventRegistry {
    pub(crate) fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&CalibrationEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let id = *next_id;
        *next_id += 1;
        callbacks.insert(id, Arc::new(callback));
        id
    }

    pub(crate) fn deregister(&self, id: CallbackId) -> bool {
        self.callbacks.lock().unwrap().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub(crate) fn emit(&self, event: &CalibrationEvent) {
        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.values() {
            callback(event);
        }
    }
}
