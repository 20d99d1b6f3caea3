//! Collaborator boundary toward the display host.
//!
//! The calibrator never renders anything itself; it commands the host through
//! this trait and consumes the host's normalized-to-scene mapping. Commands
//! are fire-and-forget.

use serde::{Deserialize, Serialize};

/// Axis a sweep line is oriented along.
///
/// A `Horizontal` line spans the display width and travels vertically, so it
/// localizes each sensor's vertical position; a `Vertical` line does the
/// opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepAxis {
    Horizontal,
    Vertical,
}

impl SweepAxis {
    /// The axis swept after this one.
    pub fn next(self) -> Option<SweepAxis> {
        match self {
            SweepAxis::Horizontal => Some(SweepAxis::Vertical),
            SweepAxis::Vertical => None,
        }
    }
}

/// A point in the host's scene coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePoint {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned fill rectangle in normalized display coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FillRegion {
    /// The whole display lit.
    pub const FULL: FillRegion = FillRegion {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Nothing lit.
    pub const OFF: FillRegion = FillRegion {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    /// True if the rectangle lies entirely within the display.
    pub fn in_bounds(&self) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.x + self.width <= 1.0 && self.y + self.height <= 1.0
    }

    /// Rectangle center along the given axis.
    pub fn center_along(&self, axis: SweepAxis) -> f64 {
        match axis {
            SweepAxis::Horizontal => self.y + self.height / 2.0,
            SweepAxis::Vertical => self.x + self.width / 2.0,
        }
    }
}

/// Host-side display surface the calibrator drives.
///
/// All positions are in normalized display units; the host owns the actual
/// display geometry and exposes it only through
/// [`map_normalized_to_scene`](DisplayLink::map_normalized_to_scene).
pub trait DisplayLink {
    /// Draw the sweep line for `axis` with its leading edge at `position`.
    ///
    /// Called once per cycle while a sweep is running. Positions outside
    /// `[0, 1]` mean the line is off-screen and the host may skip drawing.
    fn set_line_sweep_position(&mut self, axis: SweepAxis, position: f64, thickness: f64);

    /// Fill the given rectangle white and everything else black.
    ///
    /// Used by the bounds search; hosts that only run line sweeps may
    /// implement this as a no-op.
    fn set_fill_region(&mut self, region: FillRegion);

    /// Map a normalized display coordinate pair into the host scene.
    fn map_normalized_to_scene(&self, x: f64, y: f64) -> ScenePoint;
}
