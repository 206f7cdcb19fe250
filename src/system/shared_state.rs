//! State shared between the operator side and the tracking worker.
//!
//! Lock order is `track` before `duty_map`; the actuator link's own lock is
//! always taken last.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::duty_map::DutyMap;
use crate::tracking::TrackState;

pub struct SharedState {
    /// Run flag. Checked by the worker once per iteration.
    pub running: AtomicBool,

    /// Duty policy. Read by the worker on cell changes, edited by the operator.
    pub duty_map: RwLock<DutyMap>,

    /// Last known position and commanded duty. Written by the worker each
    /// accepted detection, and by the operator for manual commands.
    pub track: Mutex<TrackState>,
}

impl SharedState {
    pub fn new(duty_map: DutyMap) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            duty_map: RwLock::new(duty_map),
            track: Mutex::new(TrackState::default()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.set_running(false);
    }

    pub fn track_snapshot(&self) -> TrackState {
        *self.track.lock()
    }
}
