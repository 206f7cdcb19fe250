//! Pixel-level processing: frame preprocessing and background subtraction.
//!
//! Frames are 8-bit grayscale buffers; colour sources convert on read.

pub mod preprocess;
pub mod subtractor;

use image::GrayImage;

pub use preprocess::FramePreprocessor;
pub use subtractor::{BackgroundSubtractor, Blob};

/// One image frame. Produced by a frame source, consumed within one iteration.
pub type Frame = GrayImage;
