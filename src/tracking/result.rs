//! Per-frame outcomes and per-run counters.

use std::fmt;

use crate::grid::GridCell;

/// What one processed frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// No candidate passed the gate; state carried forward.
    NotDetected,
    /// The target was found in `cell`. `command` holds the duty sent, if any.
    Tracked { cell: GridCell, command: Option<f64> },
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_pulled: usize,
    pub frames_missing: usize,
    pub detections: usize,
    pub cell_changes: usize,
    pub duty_commands: usize,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames ({} missing), {} detections, {} cell changes, {} duty commands",
            self.frames_pulled,
            self.frames_missing,
            self.detections,
            self.cell_changes,
            self.duty_commands
        )
    }
}
