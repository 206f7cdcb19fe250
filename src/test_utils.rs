//! Synthetic frames and scripted actuators shared by unit tests.

use std::sync::Arc;

use image::Luma;
use parking_lot::Mutex;
use rand::Rng;

use crate::actuator::{Actuator, ActuatorError, IndicatorSide};
use crate::config::PreprocessConfig;
use crate::imaging::Frame;

pub const BACKGROUND_LEVEL: u8 = 40;
pub const OBJECT_LEVEL: u8 = 230;

pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::from_pixel(width, height, Luma([BACKGROUND_LEVEL]))
}

/// Blank frame with a filled `rw` x `rh` rectangle whose top-left corner is `(x, y)`.
pub fn frame_with_rect(width: u32, height: u32, x: u32, y: u32, rw: u32, rh: u32) -> Frame {
    let mut frame = blank_frame(width, height);
    for py in y..(y + rh).min(height) {
        for px in x..(x + rw).min(width) {
            frame.put_pixel(px, py, Luma([OBJECT_LEVEL]));
        }
    }
    frame
}

/// Blank frame with sensor-like noise well below the foreground threshold.
pub fn noisy_blank_frame(width: u32, height: u32, rng: &mut impl Rng) -> Frame {
    Frame::from_fn(width, height, |_, _| {
        Luma([BACKGROUND_LEVEL + rng.gen_range(0..8)])
    })
}

/// Preprocessing that leaves frames untouched.
pub fn identity_preprocess() -> PreprocessConfig {
    PreprocessConfig {
        downsample: 1,
        blur_sigma: 0.0,
        ..PreprocessConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Duty(f64),
    Indicator(IndicatorSide, bool),
}

/// Records every command; clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    commands: Arc<Mutex<Vec<Command>>>,
}

impl RecordingActuator {
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn duties(&self) -> Vec<f64> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                Command::Duty(d) => Some(*d),
                Command::Indicator(..) => None,
            })
            .collect()
    }
}

impl Actuator for RecordingActuator {
    fn send_duty(&mut self, ratio: f64) -> Result<(), ActuatorError> {
        self.commands.lock().push(Command::Duty(ratio));
        Ok(())
    }

    fn set_side_indicator(&mut self, side: IndicatorSide, on: bool) -> Result<(), ActuatorError> {
        self.commands.lock().push(Command::Indicator(side, on));
        Ok(())
    }
}

/// Rejects every command with a transport error.
#[derive(Debug, Default)]
pub struct FailingActuator;

impl Actuator for FailingActuator {
    fn send_duty(&mut self, _ratio: f64) -> Result<(), ActuatorError> {
        Err(ActuatorError::Transport("driver offline".into()))
    }

    fn set_side_indicator(&mut self, _side: IndicatorSide, _on: bool) -> Result<(), ActuatorError> {
        Err(ActuatorError::Transport("driver offline".into()))
    }
}
