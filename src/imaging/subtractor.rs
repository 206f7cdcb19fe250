//! Two-frame background subtraction and foreground blob extraction.
//!
//! A subtractor seeded with a single reference frame has no history to learn
//! variance from, so a pixel is foreground exactly when it departs from the
//! reference by more than the configured threshold.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, Contour, find_contours};
use nalgebra::Point2;

use crate::config::SubtractorConfig;
use crate::error::{Result, TrackerError};

use super::Frame;

const FOREGROUND: u8 = 255;

/// Outer contour of one foreground region, summarised by its bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Polygon area enclosed by the traced border.
    pub area: f64,
}

impl Blob {
    /// Centre of the bounding rectangle.
    pub fn centroid(&self) -> Point2<f64> {
        Point2::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    fn from_contour(contour: &Contour<i32>) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &contour.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
            area: polygon_area(contour),
        })
    }
}

/// Shoelace area of the closed border polygon.
fn polygon_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Stateless subtractor; every call is seeded afresh with its reference frame.
#[derive(Debug, Clone)]
pub struct BackgroundSubtractor {
    threshold: u8,
}

impl BackgroundSubtractor {
    pub fn new(config: &SubtractorConfig) -> Self {
        Self {
            threshold: config.foreground_threshold,
        }
    }

    /// Binary mask: 255 where `frame` departs from `reference`, 0 elsewhere.
    pub fn foreground_mask(&self, reference: &Frame, frame: &Frame) -> Result<GrayImage> {
        if reference.dimensions() != frame.dimensions() {
            return Err(TrackerError::FrameSize {
                expected: reference.dimensions(),
                actual: frame.dimensions(),
            });
        }
        let threshold = self.threshold;
        Ok(GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            let a = reference.get_pixel(x, y)[0];
            let b = frame.get_pixel(x, y)[0];
            if a.abs_diff(b) > threshold {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        }))
    }

    /// Outer contours of every foreground region of `frame` against `reference`.
    pub fn blobs(&self, reference: &Frame, frame: &Frame) -> Result<Vec<Blob>> {
        let mask = self.foreground_mask(reference, frame)?;
        Ok(extract_blobs(&mask))
    }
}

/// Outermost borders of a binary mask. Hole borders, and regions lying inside
/// another region's hole, are skipped.
pub fn extract_blobs(mask: &GrayImage) -> Vec<Blob> {
    find_contours::<i32>(mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(Blob::from_contour)
        .collect()
}
