//! Tracking: the control loop that turns cell changes into duty commands.
//!
//! - `tracker`: per-frame core (detect, map, validate, actuate)
//! - `controller`: lifecycle state machine and worker thread
//! - `state`: controller lifecycle and per-session track state
//! - `result`: per-frame outcomes and per-run counters

pub mod controller;
pub mod result;
pub mod state;
pub mod tracker;

pub use controller::TrackingController;
pub use result::{LoopStats, StepOutcome};
pub use state::{ControllerState, TrackState};
pub use tracker::Tracker;
