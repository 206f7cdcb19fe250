//! Live camera frames through OpenCV's `VideoCapture`.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};
use tracing::{info, warn};

use crate::error::{Result, TrackerError};
use crate::imaging::Frame;

use super::FrameSource;

/// USB camera by device index. Each read blocks until the next exposure.
pub struct CameraSource {
    capture: videoio::VideoCapture,
    bgr: Mat,
    gray: Mat,
}

impl CameraSource {
    pub fn open(index: i32) -> Result<Self> {
        let unavailable =
            |e: opencv::Error| TrackerError::SourceUnavailable(format!("camera {}: {}", index, e));
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(unavailable)?;
        if !capture.is_opened().map_err(unavailable)? {
            return Err(TrackerError::SourceUnavailable(format!(
                "camera {} is not opened",
                index
            )));
        }
        info!("Camera {} opened", index);
        Ok(Self {
            capture,
            bgr: Mat::default(),
            gray: Mat::default(),
        })
    }

    fn read_gray(&mut self) -> opencv::Result<Option<Frame>> {
        if !self.capture.read(&mut self.bgr)? || self.bgr.empty() {
            return Ok(None);
        }
        imgproc::cvt_color_def(&self.bgr, &mut self.gray, imgproc::COLOR_BGR2GRAY)?;
        let cols = self.gray.cols() as u32;
        let rows = self.gray.rows() as u32;
        let data = self.gray.data_bytes()?.to_vec();
        Ok(Frame::from_raw(cols, rows, data))
    }
}

// SAFETY: the capture handle and scratch matrices are owned exclusively by
// this source and only touched through `&mut self`.
unsafe impl Send for CameraSource {}

impl FrameSource for CameraSource {
    fn try_read_frame(&mut self) -> Option<Frame> {
        match self.read_gray() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Camera read failed: {}", e);
                None
            }
        }
    }
}
