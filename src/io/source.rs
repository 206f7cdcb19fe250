//! Pull-based frame sources.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, TrackerError};
use crate::imaging::Frame;

/// Delivers one raw frame per call.
///
/// End of stream and transient unavailability are both `None`. Reads may
/// block (a camera waits for its next exposure); there is no timeout.
pub trait FrameSource: Send {
    fn try_read_frame(&mut self) -> Option<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn try_read_frame(&mut self) -> Option<Frame> {
        (**self).try_read_frame()
    }
}

/// In-memory frames replayed in order.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Frame>,
}

impl FrameQueue {
    pub fn new<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FrameQueue {
    fn try_read_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }
}

/// Replays a directory of still images in file-name order.
///
/// Images are decoded lazily and converted to grayscale. A file that fails to
/// decode is reported and yields `None` for that read.
#[derive(Debug)]
pub struct ImageSequence {
    paths: VecDeque<PathBuf>,
}

impl ImageSequence {
    /// List `dir`. A directory that cannot be read is `SourceUnavailable`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| {
                TrackerError::SourceUnavailable(format!("cannot list {}: {}", dir.display(), e))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        Ok(Self {
            paths: paths.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn try_read_frame(&mut self) -> Option<Frame> {
        let path = self.paths.pop_front()?;
        match image::open(&path) {
            Ok(img) => Some(img.to_luma8()),
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", path.display(), e);
                None
            }
        }
    }
}
