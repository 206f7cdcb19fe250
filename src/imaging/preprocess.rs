//! Crop, downsample and blur raw frames into the working resolution.

use image::imageops::{self, FilterType};
use imageproc::filter::gaussian_blur_f32;

use crate::config::{CropWindow, PreprocessConfig};
use crate::error::{Result, TrackerError};

use super::Frame;

/// Turns raw camera frames into canonical working-resolution frames.
///
/// Calibration and detection must see frames from the same preprocessor, so
/// the background plate and live frames share one resolution.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    crop: CropWindow,
    downsample: u32,
    blur_sigma: f32,
}

impl FramePreprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            crop: config.crop,
            downsample: config.downsample.max(1),
            blur_sigma: config.blur_sigma,
        }
    }

    /// Crop to the configured window, shrink by the integer divisor, then blur.
    pub fn process(&self, raw: &Frame) -> Result<Frame> {
        let (width, height) = raw.dimensions();
        let left = resolve_bound(self.crop.left, width, 0);
        let right = resolve_bound(self.crop.right, width, width);
        let top = resolve_bound(self.crop.top, height, 0);
        let bottom = resolve_bound(self.crop.bottom, height, height);

        if right <= left || bottom <= top {
            return Err(TrackerError::FrameSize {
                expected: (1, 1),
                actual: (right.saturating_sub(left), bottom.saturating_sub(top)),
            });
        }

        let mut frame = imageops::crop_imm(raw, left, top, right - left, bottom - top).to_image();

        if self.downsample > 1 {
            let w = frame.width() / self.downsample;
            let h = frame.height() / self.downsample;
            if w == 0 || h == 0 {
                return Err(TrackerError::FrameSize {
                    expected: (self.downsample, self.downsample),
                    actual: frame.dimensions(),
                });
            }
            frame = imageops::resize(&frame, w, h, FilterType::Triangle);
        }

        if self.blur_sigma > 0.0 {
            frame = gaussian_blur_f32(&frame, self.blur_sigma);
        }

        Ok(frame)
    }
}

/// Resolve a slice-style bound against an axis of length `len`.
fn resolve_bound(bound: Option<i32>, len: u32, edge: u32) -> u32 {
    match bound {
        None => edge,
        Some(v) if v < 0 => (len as i64 + v as i64).max(0) as u32,
        Some(v) => (v as u32).min(len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn config(crop: CropWindow, downsample: u32, blur_sigma: f32) -> PreprocessConfig {
        PreprocessConfig {
            crop,
            downsample,
            blur_sigma,
        }
    }

    #[test]
    fn test_crop_and_downsample_dimensions() {
        let raw = Frame::new(640, 480);
        let crop = CropWindow {
            top: Some(40),
            bottom: Some(-40),
            left: Some(20),
            right: Some(620),
        };
        let pre = FramePreprocessor::new(&config(crop, 2, 1.1));
        let out = pre.process(&raw).unwrap();
        assert_eq!(out.dimensions(), (300, 200));
    }

    #[test]
    fn test_identity_configuration() {
        let raw = Frame::from_fn(8, 6, |x, y| Luma([(x * 10 + y) as u8]));
        let pre = FramePreprocessor::new(&config(CropWindow::default(), 1, 0.0));
        assert_eq!(pre.process(&raw).unwrap(), raw);
    }

    #[test]
    fn test_crop_keeps_window_pixels() {
        let raw = Frame::from_fn(10, 10, |x, y| Luma([(y * 10 + x) as u8]));
        let crop = CropWindow {
            top: Some(2),
            bottom: Some(5),
            left: Some(3),
            right: None,
        };
        let pre = FramePreprocessor::new(&config(crop, 1, 0.0));
        let out = pre.process(&raw).unwrap();
        assert_eq!(out.dimensions(), (7, 3));
        assert_eq!(out.get_pixel(0, 0)[0], 23);
    }

    #[test]
    fn test_blur_smooths_step() {
        let raw = Frame::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 200 }]));
        let pre = FramePreprocessor::new(&config(CropWindow::default(), 1, 1.1));
        let out = pre.process(&raw).unwrap();
        let edge = out.get_pixel(9, 10)[0];
        assert!(edge > 0 && edge < 200);
        assert_eq!(out.get_pixel(0, 10)[0], 0);
    }

    #[test]
    fn test_empty_window_rejected() {
        let raw = Frame::new(100, 100);
        let crop = CropWindow {
            top: Some(60),
            bottom: Some(40),
            ..CropWindow::default()
        };
        let pre = FramePreprocessor::new(&config(crop, 1, 0.0));
        assert!(matches!(
            pre.process(&raw),
            Err(TrackerError::FrameSize { .. })
        ));
    }

    #[test]
    fn test_resolve_bound() {
        assert_eq!(resolve_bound(None, 100, 100), 100);
        assert_eq!(resolve_bound(Some(-10), 100, 100), 90);
        assert_eq!(resolve_bound(Some(-200), 100, 0), 0);
        assert_eq!(resolve_bound(Some(150), 100, 0), 100);
    }
}
