//! Single-target detection by background subtraction and nearest-neighbour gating.
//!
//! Every frame yields exactly one candidate: the foreground region whose
//! bounding-box centre lies closest to the previous known position. The
//! candidate is only reported as present when that squared distance is below
//! the gating threshold, so a far-away region never hijacks the track.

use nalgebra::{Point2, distance_squared};
use tracing::trace;

use crate::calibration::BackgroundPlate;
use crate::config::{AreaBand, DetectorConfig};
use crate::error::Result;
use crate::imaging::{BackgroundSubtractor, Blob, Frame};

/// Result of one detection call. Absence is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// True when the best candidate passed the gate.
    pub present: bool,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Centre of the bounding rectangle.
    pub centroid: Point2<f64>,
    pub area: f64,
}

impl Detection {
    /// Sentinel for a frame without any candidate region.
    pub fn absent() -> Self {
        Self {
            present: false,
            x: -1,
            y: -1,
            width: -1,
            height: -1,
            centroid: Point2::new(-1.0, -1.0),
            area: -1.0,
        }
    }

    fn from_blob(blob: &Blob, present: bool) -> Self {
        Self {
            present,
            x: blob.x,
            y: blob.y,
            width: blob.width,
            height: blob.height,
            centroid: blob.centroid(),
            area: blob.area,
        }
    }
}

pub struct ObjectDetector {
    subtractor: BackgroundSubtractor,
    gating_threshold: f64,
    area_band: Option<AreaBand>,
}

impl ObjectDetector {
    pub fn new(subtractor: BackgroundSubtractor, config: &DetectorConfig) -> Self {
        Self {
            subtractor,
            gating_threshold: config.gating_threshold,
            area_band: config.area_band,
        }
    }

    /// Subtract `frame` from the plate and pick the candidate nearest `previous`.
    pub fn detect(
        &self,
        background: &BackgroundPlate,
        frame: &Frame,
        previous: &Point2<f64>,
    ) -> Result<Detection> {
        let blobs = self.subtractor.blobs(background.frame(), frame)?;
        Ok(self.select(&blobs, previous))
    }

    /// Linear scan for the candidate with minimum squared distance to `previous`.
    ///
    /// The best candidate's geometry is always returned when one exists;
    /// `present` reports whether it passed the gate.
    pub fn select(&self, blobs: &[Blob], previous: &Point2<f64>) -> Detection {
        let mut best: Option<(&Blob, f64)> = None;
        for blob in blobs {
            if self.area_band.is_some_and(|band| !band.contains(blob.area)) {
                continue;
            }
            let gd = distance_squared(&blob.centroid(), previous);
            // Strict comparison keeps the first of equally distant candidates.
            if best.is_none_or(|(_, best_gd)| gd < best_gd) {
                best = Some((blob, gd));
            }
        }

        match best {
            Some((blob, gd)) => {
                let present = gd < self.gating_threshold;
                trace!(
                    "{} candidates, nearest at squared distance {:.1} (present: {})",
                    blobs.len(),
                    gd,
                    present
                );
                Detection::from_blob(blob, present)
            }
            None => Detection::absent(),
        }
    }
}
