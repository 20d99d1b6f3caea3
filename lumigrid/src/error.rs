use thiserror::Error;

/// Errors produced by the calibration state machine and peak extraction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibError {
    /// Reading count handed to an ingestion cycle does not match the grid.
    #[error("reading count mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected reading count (`x_count * y_count`).
        expected: usize,
        /// Actual reading count supplied by the caller.
        actual: usize,
    },

    /// Grid access outside the declared sensor bounds.
    #[error("sensor index ({x}, {y}) out of bounds for {x_count}x{y_count} grid")]
    IndexOutOfBounds {
        /// Requested sensor column.
        x: usize,
        /// Requested sensor row.
        y: usize,
        /// Grid width.
        x_count: usize,
        /// Grid height.
        y_count: usize,
    },

    /// Record accessor called with a sample index past the end of the record.
    ///
    /// Earlier revisions of the record buffer silently returned zero on
    /// overrun; accessors now fail instead.
    #[error("sample index {index} out of range for record of length {len}")]
    SampleOutOfRange {
        /// Requested sample index.
        index: usize,
        /// Record length at the time of the call.
        len: usize,
    },

    /// A peak cluster summed to zero centroid weight.
    ///
    /// Recovered inside extraction: the cluster is dropped with a warning and
    /// the remaining clusters are used.
    #[error("cluster at sample {start} (len {len}) has zero total centroid weight")]
    DegenerateCluster {
        /// First sample index of the cluster.
        start: usize,
        /// Number of member samples.
        len: usize,
    },

    /// `min_peak_freq` is too large for the recorded trace.
    ///
    /// Surfaced before any partial result is produced.
    #[error("trace of {len} samples is too short for a peak window of min_peak_freq {min_peak_freq}")]
    InsufficientDataForWindow {
        /// Trace length.
        len: usize,
        /// Configured minimum peak spacing.
        min_peak_freq: usize,
    },
}
