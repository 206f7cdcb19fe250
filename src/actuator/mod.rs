//! Command interface to the external motor driver.
//!
//! The driver accepts a duty ratio and side-indicator LED switches, and may
//! fail transiently. Transport failures never reach the control loop: the
//! [`ActuatorLink`] logs them and carries on, since the next cell change
//! recomputes and resends the duty anyway.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which side indicator LED to switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorSide {
    Left,
    Right,
}

impl IndicatorSide {
    pub const BOTH: [IndicatorSide; 2] = [IndicatorSide::Left, IndicatorSide::Right];
}

impl fmt::Display for IndicatorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorSide::Left => f.write_str("left"),
            IndicatorSide::Right => f.write_str("right"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("driver transport error: {0}")]
    Transport(String),

    #[error("driver pipe error: {0}")]
    Io(#[from] io::Error),
}

/// A motor driver.
pub trait Actuator: Send {
    fn send_duty(&mut self, ratio: f64) -> Result<(), ActuatorError>;

    fn set_side_indicator(&mut self, side: IndicatorSide, on: bool) -> Result<(), ActuatorError>;
}

/// Shared, fire-and-forget handle to the driver.
///
/// Clones talk to the same driver; commands from the control loop and the
/// operator are serialized by the inner lock.
#[derive(Clone)]
pub struct ActuatorLink {
    driver: Arc<Mutex<Box<dyn Actuator>>>,
}

impl ActuatorLink {
    pub fn new<A: Actuator + 'static>(driver: A) -> Self {
        Self::from_boxed(Box::new(driver))
    }

    pub fn from_boxed(driver: Box<dyn Actuator>) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// Send a duty ratio. Returns whether the driver accepted it.
    pub fn send_duty(&self, ratio: f64) -> bool {
        match self.driver.lock().send_duty(ratio) {
            Ok(()) => {
                debug!("Duty {:.3} sent", ratio);
                true
            }
            Err(e) => {
                warn!("Duty {:.3} not delivered: {}", ratio, e);
                false
            }
        }
    }

    /// Switch a side indicator. Returns whether the driver accepted it.
    pub fn set_side_indicator(&self, side: IndicatorSide, on: bool) -> bool {
        match self.driver.lock().set_side_indicator(side, on) {
            Ok(()) => true,
            Err(e) => {
                warn!("Indicator {} {} not delivered: {}", side, on_off(on), e);
                false
            }
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

/// Logs commands instead of driving hardware.
#[derive(Debug, Default)]
pub struct DryRunActuator;

impl Actuator for DryRunActuator {
    fn send_duty(&mut self, ratio: f64) -> Result<(), ActuatorError> {
        info!("[dry run] duty {:.3}", ratio);
        Ok(())
    }

    fn set_side_indicator(&mut self, side: IndicatorSide, on: bool) -> Result<(), ActuatorError> {
        info!("[dry run] indicator {} {}", side, on_off(on));
        Ok(())
    }
}

/// Writes one text command per line, e.g. to a driver process's stdin:
///
/// ```text
/// duty 0.35
/// indicator left on
/// ```
pub struct LineProtocolActuator<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineProtocolActuator<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn send_line(&mut self, line: fmt::Arguments<'_>) -> Result<(), ActuatorError> {
        self.writer.write_fmt(line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Actuator for LineProtocolActuator<W> {
    fn send_duty(&mut self, ratio: f64) -> Result<(), ActuatorError> {
        self.send_line(format_args!("duty {}", ratio))
    }

    fn set_side_indicator(&mut self, side: IndicatorSide, on: bool) -> Result<(), ActuatorError> {
        self.send_line(format_args!("indicator {} {}", side, on_off(on)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Command, FailingActuator, RecordingActuator};

    /// Writer whose pipe is already closed.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_protocol_format() {
        let mut driver = LineProtocolActuator::new(Vec::new());
        driver.send_duty(0.35).unwrap();
        driver.send_duty(-1.0).unwrap();
        driver.set_side_indicator(IndicatorSide::Left, true).unwrap();
        driver.set_side_indicator(IndicatorSide::Right, false).unwrap();

        let out = String::from_utf8(driver.into_inner()).unwrap();
        assert_eq!(
            out,
            "duty 0.35\nduty -1\nindicator left on\nindicator right off\n"
        );
    }

    #[test]
    fn test_line_protocol_reports_broken_pipe() {
        let mut driver = LineProtocolActuator::new(BrokenPipe);
        assert!(matches!(driver.send_duty(0.5), Err(ActuatorError::Io(_))));
    }

    #[test]
    fn test_link_swallows_transport_errors() {
        let link = ActuatorLink::new(FailingActuator);
        assert!(!link.send_duty(0.5));
        assert!(!link.set_side_indicator(IndicatorSide::Left, true));
    }

    #[test]
    fn test_link_clones_share_driver() {
        let recorder = RecordingActuator::default();
        let link = ActuatorLink::new(recorder.clone());
        let other = link.clone();

        assert!(link.send_duty(0.2));
        assert!(other.set_side_indicator(IndicatorSide::Right, true));
        assert_eq!(
            recorder.commands(),
            vec![
                Command::Duty(0.2),
                Command::Indicator(IndicatorSide::Right, true)
            ]
        );
    }
}
