//! Tracker configuration, loaded from YAML.
//!
//! Every section has defaults, so a configuration file only needs the keys it
//! overrides.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::GridCell;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub preprocess: PreprocessConfig,
    pub subtractor: SubtractorConfig,
    pub calibration: CalibrationConfig,
    pub detection: DetectorConfig,
    pub session: SessionConfig,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: SourceConfig,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub actuator: ActuatorConfig,
}

impl TrackerConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Crop window in raw-frame pixels, with slice semantics.
///
/// `top`/`left` are inclusive starts and `bottom`/`right` exclusive ends.
/// Negative values count back from the far edge; `None` means the edge itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropWindow {
    pub top: Option<i32>,
    pub bottom: Option<i32>,
    pub left: Option<i32>,
    pub right: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub crop: CropWindow,
    /// Integer divisor applied to both axes after cropping.
    pub downsample: u32,
    /// Gaussian sigma; 1.1 matches a 5x5 kernel. Values <= 0 disable blurring.
    pub blur_sigma: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            crop: CropWindow::default(),
            downsample: 2,
            blur_sigma: 1.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtractorConfig {
    /// Absolute intensity difference above which a pixel is foreground.
    /// 37 is 2.5 standard deviations of a freshly seeded model's noise (15).
    pub foreground_threshold: u8,
}

impl Default for SubtractorConfig {
    fn default() -> Self {
        Self {
            foreground_threshold: 37,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Consecutive frames with motion tolerated before giving up (~6 s at 30 fps).
    pub max_unstable_frames: usize,
    /// Consecutive still frames required before a plate is accepted.
    pub required_stable_frames: usize,
    /// Where the accepted plate is written, if anywhere.
    pub plate_path: Option<PathBuf>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_unstable_frames: 180,
            required_stable_frames: 45,
            plate_path: None,
        }
    }
}

/// Inclusive contour-area band, in working-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaBand {
    pub min: f64,
    pub max: f64,
}

impl AreaBand {
    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Squared pixel distance below which the closest candidate counts as the target.
    pub gating_threshold: f64,
    /// Candidates outside this band are ignored. Disabled when `None`.
    pub area_band: Option<AreaBand>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            gating_threshold: 20.0,
            area_band: None,
        }
    }
}

/// Values carried over from the previous session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cell the vehicle is placed in before tracking starts.
    pub start_cell: GridCell,
    pub duty_map_path: Option<PathBuf>,
    pub detection_log_path: Option<PathBuf>,
    /// Number of frame pulls per run; unbounded when `None`.
    pub frame_budget: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    /// Replay a directory of still images in file-name order.
    ImageDir { path: PathBuf },
    /// Live camera by device index (requires the `camera` feature).
    Camera { index: i32 },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Camera { index: 0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorConfig {
    /// Log commands without sending them anywhere.
    #[default]
    DryRun,
    /// Spawn a driver process and write line commands to its stdin.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}
