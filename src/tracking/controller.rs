//! Tracking controller: lifecycle, worker thread and operator operations.
//!
//! The control loop runs on its own thread so the operator side stays
//! responsive. The worker owns the frame source and detection log while it
//! runs and hands both back when it is joined.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::actuator::{ActuatorLink, IndicatorSide};
use crate::calibration::{BackgroundCalibrator, BackgroundPlate};
use crate::config::TrackerConfig;
use crate::detection::ObjectDetector;
use crate::duty_map::{DutyMap, validate_duty};
use crate::error::{Result, TrackerError};
use crate::grid::{GridCell, GridMapper};
use crate::imaging::{BackgroundSubtractor, FramePreprocessor};
use crate::io::{DetectionLog, FrameSource};
use crate::system::SharedState;
use crate::tracking::result::LoopStats;
use crate::tracking::state::{ControllerState, TrackState};
use crate::tracking::tracker::Tracker;

/// Everything the worker hands back when it exits.
struct WorkerExit {
    source: Box<dyn FrameSource>,
    log: Option<Box<dyn DetectionLog>>,
    stats: LoopStats,
    result: Result<()>,
}

pub struct TrackingController {
    config: TrackerConfig,
    shared: Arc<SharedState>,
    actuator: ActuatorLink,
    state: ControllerState,

    /// Current background plate. Survives stop/start; replaced by `calibrate`.
    plate: Option<Arc<BackgroundPlate>>,

    /// Held here while idle, moved into the worker while running.
    source: Option<Box<dyn FrameSource>>,
    log: Option<Box<dyn DetectionLog>>,

    worker: Option<JoinHandle<WorkerExit>>,
    last_stats: Option<LoopStats>,
    shut_down: bool,
}

impl TrackingController {
    pub fn new(
        config: TrackerConfig,
        duty_map: DutyMap,
        source: Box<dyn FrameSource>,
        actuator: ActuatorLink,
    ) -> Self {
        Self {
            config,
            shared: SharedState::new(duty_map),
            actuator,
            state: ControllerState::Idle,
            plate: None,
            source: Some(source),
            log: None,
            worker: None,
            last_stats: None,
            shut_down: false,
        }
    }

    /// Send every accepted detection to `log`.
    pub fn with_detection_log(mut self, log: Box<dyn DetectionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Lifecycle state as last changed by an operator call.
    ///
    /// A loop that ends on its own (budget used up, or a terminal error) stays
    /// `Running` here until `wait`, `stop` or the next `start` collects it. Use
    /// [`loop_finished`](Self::loop_finished) to see that it has ended.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// True once a started loop has exited but has not been collected yet.
    pub fn loop_finished(&self) -> bool {
        self.state == ControllerState::Running && !self.shared.is_running()
    }

    pub fn track_state(&self) -> TrackState {
        self.shared.track_snapshot()
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn plate(&self) -> Option<&BackgroundPlate> {
        self.plate.as_deref()
    }

    /// Counters of the most recently finished run.
    pub fn last_stats(&self) -> Option<LoopStats> {
        self.last_stats
    }

    /// Snapshot of the duty map.
    pub fn duty_map(&self) -> DutyMap {
        self.shared.duty_map.read().clone()
    }

    /// Acquire a fresh background plate. Blocks until the scene settles or
    /// calibration fails; a failure keeps the previous plate.
    pub fn calibrate(&mut self) -> Result<()> {
        if self.state == ControllerState::Running {
            return Err(TrackerError::invalid_operation(
                "cannot calibrate while tracking is running",
            ));
        }
        let source = self.source.as_mut().ok_or_else(|| {
            TrackerError::SourceUnavailable("frame source was lost with the worker".into())
        })?;

        let calibrator = BackgroundCalibrator::new(
            FramePreprocessor::new(&self.config.preprocess),
            BackgroundSubtractor::new(&self.config.subtractor),
            self.config.calibration.clone(),
        );
        let plate = calibrator.acquire(source.as_mut())?;
        self.plate = Some(Arc::new(plate));
        Ok(())
    }

    /// Start tracking from the configured starting cell.
    ///
    /// Calibrates first if there is no plate yet, resets the track state and
    /// sends the starting cell's duty before the worker begins.
    pub fn start(&mut self) -> Result<()> {
        self.collect_finished_loop();
        if self.state == ControllerState::Running {
            return Err(TrackerError::invalid_operation("tracking is already running"));
        }
        if self.plate.is_none() {
            self.calibrate()?;
        }
        let plate = match &self.plate {
            Some(plate) => Arc::clone(plate),
            None => return Err(TrackerError::calibration("no background plate")),
        };

        let start = self.config.session.start_cell;
        let (size, start_duty) = {
            let map = self.shared.duty_map.read();
            let size = map.grid_size();
            if !size.contains(start) {
                return Err(TrackerError::StartCellOutOfRange {
                    cell: start,
                    width: map.width(),
                    height: map.height(),
                });
            }
            (size, map.get_cell(start))
        };
        let mapper = GridMapper::new(plate.width(), plate.height(), size)?;

        let mut source = self.source.take().ok_or_else(|| {
            TrackerError::SourceUnavailable("frame source was lost with the worker".into())
        })?;

        {
            let mut track = self.shared.track.lock();
            *track = TrackState {
                previous_centroid: mapper.cell_center(start),
                previous_cell: start,
                current_duty: start_duty,
            };
            self.actuator.send_duty(start_duty);
        }

        let subtractor = BackgroundSubtractor::new(&self.config.subtractor);
        let tracker = Tracker::new(
            FramePreprocessor::new(&self.config.preprocess),
            ObjectDetector::new(subtractor, &self.config.detection),
            plate,
            mapper,
            Arc::clone(&self.shared),
            self.actuator.clone(),
            self.log.take(),
        );
        let budget = self.config.session.frame_budget;
        let shared = Arc::clone(&self.shared);

        self.shared.set_running(true);
        self.worker = Some(thread::spawn(move || {
            let mut tracker = tracker;
            let result = tracker.run(source.as_mut(), budget);
            shared.set_running(false);
            if let Err(e) = &result {
                error!("Tracking loop aborted: {}", e);
            }
            WorkerExit {
                source,
                stats: tracker.stats(),
                log: tracker.into_log(),
                result,
            }
        }));
        self.state = ControllerState::Running;
        info!("Tracking started at cell {} with duty {:.3}", start, start_duty);
        Ok(())
    }

    /// Stop the loop between iterations and join the worker.
    ///
    /// Sends no commands. Returns the run's counters, or the error that ended
    /// the run early.
    pub fn stop(&mut self) -> Result<LoopStats> {
        if self.state != ControllerState::Running {
            return Err(TrackerError::invalid_operation("tracking is not running"));
        }
        self.shared.request_stop();
        let result = self.join_worker();
        self.state = ControllerState::Stopped;
        info!("Tracking stopped");
        result
    }

    /// Block until a bounded replay uses up its frame budget, then return to `Idle`.
    pub fn wait(&mut self) -> Result<LoopStats> {
        if self.state != ControllerState::Running {
            return Err(TrackerError::invalid_operation("tracking is not running"));
        }
        if self.config.session.frame_budget.is_none() {
            return Err(TrackerError::invalid_operation(
                "no frame budget configured; the loop only ends on stop",
            ));
        }
        let result = self.join_worker();
        self.state = ControllerState::Idle;
        result
    }

    /// Join a worker whose loop already ended and return to `Idle`.
    fn collect_finished_loop(&mut self) {
        if !self.loop_finished() {
            return;
        }
        match self.join_worker() {
            Ok(stats) => info!("Previous run finished: {}", stats),
            Err(e) => warn!("Previous run ended with error: {}", e),
        }
        self.state = ControllerState::Idle;
    }

    fn join_worker(&mut self) -> Result<LoopStats> {
        let Some(handle) = self.worker.take() else {
            return Err(TrackerError::WorkerPanicked);
        };
        match handle.join() {
            Ok(exit) => {
                self.source = Some(exit.source);
                self.log = exit.log;
                self.last_stats = Some(exit.stats);
                exit.result.map(|()| exit.stats)
            }
            Err(_) => {
                self.shared.request_stop();
                Err(TrackerError::WorkerPanicked)
            }
        }
    }

    /// Edit one cell's duty. While running, a change to the occupied cell is
    /// sent immediately.
    pub fn set_duty(&self, col: usize, row: usize, value: f64) -> Result<()> {
        let value = validate_duty(value)?;
        let mut track = self.shared.track.lock();
        let mut map = self.shared.duty_map.write();
        if !map.grid_size().contains(GridCell::new(col, row)) {
            return Err(TrackerError::invalid_operation(format!(
                "cell ({}, {}) is outside the {}x{} duty map",
                col,
                row,
                map.width(),
                map.height()
            )));
        }
        map.set(col, row, value)?;
        drop(map);

        let occupied = track.previous_cell == GridCell::new(col, row);
        if self.shared.is_running() && occupied && track.current_duty != value {
            self.actuator.send_duty(value);
            track.current_duty = value;
        }
        Ok(())
    }

    /// Replace the duty map. A failed load keeps the current map.
    pub fn load_duty_map<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if self.state == ControllerState::Running {
            return Err(TrackerError::invalid_operation(
                "cannot replace the duty map while tracking is running",
            ));
        }
        let map = DutyMap::load(path)?;
        *self.shared.duty_map.write() = map;
        Ok(())
    }

    pub fn save_duty_map<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let map = self.shared.duty_map.read().clone();
        map.save(path)
    }

    /// Send an operator duty command. Rejected while tracking is running.
    pub fn manual_duty(&self, ratio: f64) -> Result<()> {
        if self.state == ControllerState::Running {
            return Err(TrackerError::invalid_operation(
                "manual duty is not available while tracking is running",
            ));
        }
        let ratio = validate_duty(ratio)?;
        let mut track = self.shared.track.lock();
        self.actuator.send_duty(ratio);
        track.current_duty = ratio;
        Ok(())
    }

    pub fn halt(&self) -> Result<()> {
        self.manual_duty(0.0)
    }

    pub fn set_side_indicator(&self, side: IndicatorSide, on: bool) {
        self.actuator.set_side_indicator(side, on);
    }

    /// Stop any running loop, zero the duty and switch both indicators off.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if self.state == ControllerState::Running {
            if let Err(e) = self.stop() {
                warn!("Tracking ended with error: {}", e);
            }
        }
        self.actuator.send_duty(0.0);
        for side in IndicatorSide::BOTH {
            self.actuator.set_side_indicator(side, false);
        }
        self.shared.track.lock().current_duty = 0.0;
        self.shut_down = true;
    }
}

impl Drop for TrackingController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::io::FrameQueue;
    use crate::test_utils::{
        Command, RecordingActuator, blank_frame, frame_with_rect, identity_preprocess,
    };
    use nalgebra::Point2;

    fn config(start: GridCell, budget: Option<usize>) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.preprocess = identity_preprocess();
        config.calibration = CalibrationConfig {
            max_unstable_frames: 10,
            required_stable_frames: 2,
            plate_path: None,
        };
        config.session.start_cell = start;
        config.session.frame_budget = budget;
        config
    }

    fn duty_map() -> DutyMap {
        DutyMap::from_rows(vec![vec![0.1, 0.2, 0.3, 0.4], vec![-0.1, -0.2, -0.3, -0.4]]).unwrap()
    }

    /// Calibration frames followed by `extra`.
    fn source(extra: Vec<crate::imaging::Frame>) -> Box<dyn FrameSource> {
        let mut frames = vec![blank_frame(100, 80); 4];
        frames.extend(extra);
        Box::new(FrameQueue::new(frames))
    }

    fn controller(
        start: GridCell,
        budget: Option<usize>,
        extra: Vec<crate::imaging::Frame>,
    ) -> (TrackingController, RecordingActuator) {
        let recorder = RecordingActuator::default();
        let controller = TrackingController::new(
            config(start, budget),
            duty_map(),
            source(extra),
            ActuatorLink::new(recorder.clone()),
        );
        (controller, recorder)
    }

    #[test]
    fn test_start_initialises_track_and_sends_start_duty() {
        let (mut c, recorder) = controller(GridCell::new(2, 1), Some(0), vec![]);
        c.start().unwrap();
        assert_eq!(c.state(), ControllerState::Running);

        let track = c.track_state();
        assert_eq!(track.previous_cell, GridCell::new(2, 1));
        assert_eq!(track.previous_centroid, Point2::new(62.5, 60.0));
        assert_eq!(track.current_duty, -0.3);
        assert_eq!(recorder.duties(), vec![-0.3]);

        c.wait().unwrap();
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.plate().unwrap().dimensions(), (100, 80));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (mut c, recorder) = controller(GridCell::new(0, 0), None, vec![]);
        c.start().unwrap();
        let before = c.track_state();

        let err = c.start().unwrap_err();
        assert!(matches!(err, TrackerError::InvalidOperation(_)));
        assert_eq!(c.track_state(), before);
        assert_eq!(recorder.duties(), vec![0.1]);

        c.stop().unwrap();
        assert_eq!(c.state(), ControllerState::Stopped);
    }

    #[test]
    fn test_stop_when_not_running_is_rejected() {
        let (mut c, _) = controller(GridCell::new(0, 0), None, vec![]);
        assert!(matches!(c.stop(), Err(TrackerError::InvalidOperation(_))));
    }

    #[test]
    fn test_wait_requires_budget() {
        let (mut c, _) = controller(GridCell::new(0, 0), None, vec![]);
        c.start().unwrap();
        assert!(matches!(c.wait(), Err(TrackerError::InvalidOperation(_))));
        assert_eq!(c.state(), ControllerState::Running);
        c.stop().unwrap();
    }

    #[test]
    fn test_start_cell_outside_map() {
        let (mut c, recorder) = controller(GridCell::new(4, 0), Some(0), vec![]);
        let err = c.start().unwrap_err();
        assert!(matches!(err, TrackerError::StartCellOutOfRange { .. }));
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_calibration_failure_blocks_start() {
        let recorder = RecordingActuator::default();
        let mut c = TrackingController::new(
            config(GridCell::new(0, 0), Some(0)),
            duty_map(),
            Box::new(FrameQueue::new(Vec::new())),
            ActuatorLink::new(recorder.clone()),
        );
        assert!(matches!(c.start(), Err(TrackerError::CalibrationFailed(_))));
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_replay_sends_duty_on_cell_change() {
        // Centroids (18, 20), (24, 20), (29, 20): the last one crosses into cell (1, 0).
        let frames = vec![
            frame_with_rect(100, 80, 15, 17, 6, 6),
            frame_with_rect(100, 80, 21, 17, 6, 6),
            frame_with_rect(100, 80, 26, 17, 6, 6),
        ];
        let mut config = config(GridCell::new(0, 0), Some(3));
        config.detection.gating_threshold = 50.0;
        let recorder = RecordingActuator::default();
        let mut c = TrackingController::new(
            config,
            duty_map(),
            source(frames),
            ActuatorLink::new(recorder.clone()),
        );

        c.start().unwrap();
        let stats = c.wait().unwrap();
        assert_eq!(stats.detections, 3);
        assert_eq!(stats.cell_changes, 1);
        assert_eq!(recorder.duties(), vec![0.1, 0.2]);
        assert_eq!(c.track_state().previous_cell, GridCell::new(1, 0));
        assert_eq!(c.last_stats(), Some(stats));
    }

    #[test]
    fn test_live_edit_of_occupied_cell_is_sent() {
        let (mut c, recorder) = controller(GridCell::new(1, 1), None, vec![]);
        c.start().unwrap();

        c.set_duty(1, 1, 0.5).unwrap();
        c.set_duty(0, 0, 0.9).unwrap();
        c.set_duty(1, 1, 0.5).unwrap();
        assert_eq!(recorder.duties(), vec![-0.2, 0.5]);
        assert_eq!(c.track_state().current_duty, 0.5);
        assert_eq!(c.duty_map().get(0, 0), 0.9);

        c.stop().unwrap();
        c.set_duty(1, 1, 0.7).unwrap();
        assert_eq!(recorder.duties(), vec![-0.2, 0.5]);
    }

    #[test]
    fn test_set_duty_validation() {
        let (c, _) = controller(GridCell::new(0, 0), None, vec![]);
        assert!(matches!(
            c.set_duty(0, 0, 1.5),
            Err(TrackerError::DutyOutOfRange { .. })
        ));
        assert!(matches!(
            c.set_duty(9, 0, 0.5),
            Err(TrackerError::InvalidOperation(_))
        ));
        assert_eq!(c.duty_map(), duty_map());
    }

    #[test]
    fn test_manual_commands_only_when_not_running() {
        let (mut c, recorder) = controller(GridCell::new(0, 0), None, vec![]);
        c.manual_duty(0.6).unwrap();
        c.halt().unwrap();
        assert_eq!(recorder.duties(), vec![0.6, 0.0]);

        c.start().unwrap();
        assert!(matches!(c.halt(), Err(TrackerError::InvalidOperation(_))));
        assert!(matches!(
            c.load_duty_map("unused.csv"),
            Err(TrackerError::InvalidOperation(_))
        ));
        c.stop().unwrap();
    }

    #[test]
    fn test_duty_map_save_and_reload() {
        let path = std::env::temp_dir().join(format!("controller_map_{}.csv", std::process::id()));
        let (c, _) = controller(GridCell::new(0, 0), None, vec![]);
        c.set_duty(3, 1, 1.0).unwrap();
        c.save_duty_map(&path).unwrap();

        let (other, _) = controller(GridCell::new(0, 0), None, vec![]);
        other.load_duty_map(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(other.duty_map().get(3, 1), 1.0);
    }

    #[test]
    fn test_failed_reload_keeps_current_map() {
        let dir = std::env::temp_dir();
        let ragged = dir.join(format!("controller_ragged_{}.csv", std::process::id()));
        let out_of_range = dir.join(format!("controller_range_{}.csv", std::process::id()));
        std::fs::write(&ragged, "0,0,0\n0,0\n").unwrap();
        std::fs::write(&out_of_range, "0,0\n0,-2\n").unwrap();

        let (c, _) = controller(GridCell::new(0, 0), None, vec![]);
        let ragged_result = c.load_duty_map(&ragged);
        let range_result = c.load_duty_map(&out_of_range);
        std::fs::remove_file(&ragged).ok();
        std::fs::remove_file(&out_of_range).ok();

        assert!(matches!(ragged_result, Err(TrackerError::MalformedDutyMap(_))));
        assert!(matches!(range_result, Err(TrackerError::DutyOutOfRange { .. })));
        assert_eq!(c.duty_map(), duty_map());
    }

    #[test]
    fn test_start_collects_loop_that_ended_on_its_own() {
        let (mut c, recorder) = controller(GridCell::new(0, 0), Some(0), vec![]);
        c.start().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !c.loop_finished() {
            assert!(std::time::Instant::now() < deadline, "loop never finished");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(c.state(), ControllerState::Running);

        c.start().unwrap();
        assert_eq!(c.state(), ControllerState::Running);
        assert_eq!(recorder.duties(), vec![0.1, 0.1]);
        assert_eq!(c.last_stats().map(|s| s.frames_pulled), Some(0));
        c.wait().unwrap();
        assert!(!c.loop_finished());
    }

    #[test]
    fn test_shutdown_zeroes_duty_and_indicators() {
        let (mut c, recorder) = controller(GridCell::new(0, 1), None, vec![]);
        c.start().unwrap();
        c.set_side_indicator(IndicatorSide::Left, true);
        drop(c);

        assert_eq!(
            recorder.commands(),
            vec![
                Command::Duty(-0.1),
                Command::Indicator(IndicatorSide::Left, true),
                Command::Duty(0.0),
                Command::Indicator(IndicatorSide::Left, false),
                Command::Indicator(IndicatorSide::Right, false),
            ]
        );
    }
}
