pub mod actuator;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod duty_map;
pub mod error;
pub mod grid;
pub mod imaging;
pub mod io;
pub mod system;
pub mod tracking;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Result, TrackerError};
