//! Background calibration: wait for a still scene and capture it as the plate.
//!
//! Consecutive preprocessed frames are differenced pairwise. Motion between a
//! pair resets the stillness streak; a long enough streak of motion-free
//! pairs accepts the most recent frame as the background plate. The motion
//! count is never reset during one acquisition, which bounds how long a
//! restless scene can keep calibration running.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::error::{Result, TrackerError};
use crate::imaging::{BackgroundSubtractor, Frame, FramePreprocessor};
use crate::io::FrameSource;

/// Reference image of the empty course at working resolution.
///
/// Replaced only by recalibration; shared read-only by every detection call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundPlate {
    frame: Frame,
}

impl BackgroundPlate {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    /// Write the plate as an image file; the format follows the extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.frame.save(path.as_ref())?;
        Ok(())
    }
}

/// Drives the settle/fail streaks that decide when the scene is still.
pub struct BackgroundCalibrator {
    preprocessor: FramePreprocessor,
    subtractor: BackgroundSubtractor,
    config: CalibrationConfig,
}

impl BackgroundCalibrator {
    pub fn new(
        preprocessor: FramePreprocessor,
        subtractor: BackgroundSubtractor,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            preprocessor,
            subtractor,
            config,
        }
    }

    /// Block until the scene has been still for longer than
    /// `required_stable_frames` consecutive frames.
    ///
    /// Fails with `CalibrationFailed` once more than `max_unstable_frames`
    /// frames showed motion, or the source stops delivering frames.
    pub fn acquire(&self, source: &mut dyn FrameSource) -> Result<BackgroundPlate> {
        info!("Calibrating background plate");

        let mut reference = self.next_frame(source)?;
        let mut stable_streak = 0usize;
        let mut unstable_frames = 0usize;

        loop {
            let frame = self.next_frame(source)?;
            let blobs = self.subtractor.blobs(&reference, &frame)?;
            reference = frame;

            if blobs.is_empty() {
                stable_streak += 1;
                if stable_streak > self.config.required_stable_frames {
                    break;
                }
            } else {
                debug!(
                    "Scene not settled: {} regions moved ({} unstable frames)",
                    blobs.len(),
                    unstable_frames + 1
                );
                stable_streak = 0;
                unstable_frames += 1;
                if unstable_frames > self.config.max_unstable_frames {
                    return Err(TrackerError::calibration(format!(
                        "scene did not settle within {} frames",
                        self.config.max_unstable_frames
                    )));
                }
            }
        }

        let plate = BackgroundPlate::new(reference);
        if let Some(path) = &self.config.plate_path {
            if let Err(e) = plate.save(path) {
                warn!("Could not write background plate to {}: {}", path.display(), e);
            }
        }

        info!(
            "Background plate accepted ({}x{}) after {} unstable frames",
            plate.width(),
            plate.height(),
            unstable_frames
        );
        Ok(plate)
    }

    /// Next preprocessed frame. Gaps are skipped, but a source that stays
    /// silent for as long as the motion budget fails calibration.
    fn next_frame(&self, source: &mut dyn FrameSource) -> Result<Frame> {
        let mut missing = 0usize;
        loop {
            if let Some(raw) = source.try_read_frame() {
                return self.preprocessor.process(&raw);
            }
            missing += 1;
            if missing > self.config.max_unstable_frames {
                return Err(TrackerError::calibration(format!(
                    "frame source delivered nothing for {} consecutive reads",
                    missing
                )));
            }
        }
    }
}
