//! Per-detection log records and the sinks that receive them.
//!
//! Logging is fire-and-forget from the control loop's point of view: sinks
//! never return errors, they report their own failures.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detection::Detection;
use crate::error::Result;
use crate::grid::GridCell;

/// One accepted detection, as written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub col: usize,
    pub row: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub width: i32,
    pub height: i32,
    pub area: f64,
}

impl DetectionRecord {
    pub fn new(cell: GridCell, detection: &Detection) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            timestamp,
            col: cell.col,
            row: cell.row,
            centroid_x: detection.centroid.x,
            centroid_y: detection.centroid.y,
            width: detection.width,
            height: detection.height,
            area: detection.area,
        }
    }
}

/// Receives every accepted detection.
pub trait DetectionLog: Send {
    fn record(&mut self, record: &DetectionRecord);
}

/// Writes records as CSV rows under a header line. Buffered rows are flushed
/// when the log is dropped.
pub struct CsvDetectionLog<W: Write> {
    writer: csv::Writer<W>,
    failed: bool,
}

impl CsvDetectionLog<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::create(path.as_ref())?))
    }
}

impl<W: Write> CsvDetectionLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            failed: false,
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

impl<W: Write + Send> DetectionLog for CsvDetectionLog<W> {
    fn record(&mut self, record: &DetectionRecord) {
        if let Err(e) = self.writer.serialize(record) {
            // Report once; a broken log must not flood the output every frame.
            if !self.failed {
                warn!("Detection log write failed: {}", e);
                self.failed = true;
            }
        }
    }
}

/// Forwards records to another thread. Records are dropped while the
/// receiver lags or after it hangs up.
pub struct ChannelDetectionLog {
    sender: Sender<DetectionRecord>,
    dropped: usize,
}

impl ChannelDetectionLog {
    pub fn new(sender: Sender<DetectionRecord>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Records discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl DetectionLog for ChannelDetectionLog {
    fn record(&mut self, record: &DetectionRecord) {
        match self.sender.try_send(*record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}
