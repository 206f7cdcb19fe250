//! Controller lifecycle and per-session tracking state.

use nalgebra::Point2;

use crate::grid::GridCell;

/// Lifecycle of the tracking controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No loop has run yet, or a bounded replay ran to completion.
    #[default]
    Idle,
    /// The worker is pulling frames.
    Running,
    /// The operator stopped the loop.
    Stopped,
}

/// What the loop remembers between iterations. Reset on every start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackState {
    /// Gating reference for the next detection.
    pub previous_centroid: Point2<f64>,
    pub previous_cell: GridCell,
    /// Last duty ratio handed to the actuator.
    pub current_duty: f64,
}

impl Default for TrackState {
    fn default() -> Self {
        Self {
            previous_centroid: Point2::origin(),
            previous_cell: GridCell::default(),
            current_duty: 0.0,
        }
    }
}
