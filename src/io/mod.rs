//! External interfaces: frame sources and the detection log.

#[cfg(feature = "camera")]
pub mod camera;
pub mod detection_log;
pub mod source;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use detection_log::{ChannelDetectionLog, CsvDetectionLog, DetectionLog, DetectionRecord};
pub use source::{FrameQueue, FrameSource, ImageSequence};
