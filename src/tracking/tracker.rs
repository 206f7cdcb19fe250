//! Control-loop core: one frame in, at most one duty command out.
//!
//! Per frame:
//! - preprocess to working resolution
//! - detect against the background plate, gated on the previous centroid
//! - map the centroid onto the grid and validate it
//! - log the detection
//! - on a cell change, send the cell's duty if it differs from the current one

use std::sync::Arc;
use std::thread;

use tracing::{debug, info};

use crate::actuator::ActuatorLink;
use crate::calibration::BackgroundPlate;
use crate::detection::{Detection, ObjectDetector};
use crate::error::{Result, TrackerError};
use crate::grid::{GridCell, GridMapper};
use crate::imaging::{Frame, FramePreprocessor};
use crate::io::{DetectionLog, DetectionRecord, FrameSource};
use crate::system::SharedState;
use crate::tracking::result::{LoopStats, StepOutcome};

pub struct Tracker {
    preprocessor: FramePreprocessor,
    detector: ObjectDetector,
    plate: Arc<BackgroundPlate>,
    mapper: GridMapper,

    /// Run flag, duty map and track state.
    shared: Arc<SharedState>,
    actuator: ActuatorLink,

    /// Receives every accepted detection, if set.
    log: Option<Box<dyn DetectionLog>>,

    stats: LoopStats,
}

impl Tracker {
    pub fn new(
        preprocessor: FramePreprocessor,
        detector: ObjectDetector,
        plate: Arc<BackgroundPlate>,
        mapper: GridMapper,
        shared: Arc<SharedState>,
        actuator: ActuatorLink,
        log: Option<Box<dyn DetectionLog>>,
    ) -> Self {
        Self {
            preprocessor,
            detector,
            plate,
            mapper,
            shared,
            actuator,
            log,
            stats: LoopStats::default(),
        }
    }

    /// Pull and process frames until the run flag clears or `budget` pulls are used.
    ///
    /// A missing frame skips the iteration. Any error ends the run.
    pub fn run(&mut self, source: &mut dyn FrameSource, budget: Option<usize>) -> Result<()> {
        info!("Tracking loop started");
        while self.shared.is_running() {
            if budget.is_some_and(|b| self.stats.frames_pulled >= b) {
                info!("Frame budget of {} exhausted", self.stats.frames_pulled);
                break;
            }

            self.stats.frames_pulled += 1;
            let Some(raw) = source.try_read_frame() else {
                self.stats.frames_missing += 1;
                thread::yield_now();
                continue;
            };

            self.step(&raw)?;
        }
        info!("Tracking loop finished: {}", self.stats);
        Ok(())
    }

    /// Process one raw frame.
    pub fn step(&mut self, raw: &Frame) -> Result<StepOutcome> {
        let frame = self.preprocessor.process(raw)?;
        let previous = self.shared.track.lock().previous_centroid;

        let detection = self.detector.detect(&self.plate, &frame, &previous)?;
        if !detection.present {
            return Ok(StepOutcome::NotDetected);
        }
        self.stats.detections += 1;

        let cell = self.validate(&detection)?;
        if let Some(log) = self.log.as_mut() {
            log.record(&DetectionRecord::new(cell, &detection));
        }

        let mut track = self.shared.track.lock();
        let mut command = None;
        if cell != track.previous_cell {
            self.stats.cell_changes += 1;
            let duty = self.shared.duty_map.read().get_cell(cell);
            debug!(
                "Cell {} -> {} (duty {:.3})",
                track.previous_cell, cell, duty
            );
            if duty != track.current_duty {
                self.actuator.send_duty(duty);
                track.current_duty = duty;
                command = Some(duty);
                self.stats.duty_commands += 1;
            }
            track.previous_cell = cell;
        }
        track.previous_centroid = detection.centroid;

        Ok(StepOutcome::Tracked { cell, command })
    }

    /// The detection's cell, provided it lies on the grid and the detection
    /// lies on the plate.
    fn validate(&self, detection: &Detection) -> Result<GridCell> {
        let (col, row) = self.mapper.to_cell(&detection.centroid);
        let (w, h) = self.plate.dimensions();
        let c = detection.centroid;
        let on_plate = c.x >= 0.0 && c.y >= 0.0 && c.x <= w as f64 && c.y <= h as f64;
        let sized = detection.width >= 0 && detection.height >= 0;

        match GridCell::checked(col, row, self.mapper.size()) {
            Some(cell) if on_plate && sized => Ok(cell),
            _ => Err(TrackerError::OutOfRangeDetection {
                col,
                row,
                x: c.x,
                y: c.y,
                width: detection.width,
                height: detection.height,
            }),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Hand back the detection log once the run is over.
    pub fn into_log(self) -> Option<Box<dyn DetectionLog>> {
        self.log
    }
}
