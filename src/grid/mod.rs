//! Course grid geometry: cells, grid dimensions and pixel-to-cell mapping.

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// One cell of the course grid, indexed by column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCell {
    pub col: usize,
    pub row: usize,
}

impl GridCell {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// Build a cell from raw signed indices, or `None` if it falls outside `size`.
    pub fn checked(col: i64, row: i64, size: GridSize) -> Option<Self> {
        if col < 0 || row < 0 {
            return None;
        }
        let cell = Self::new(col as usize, row as usize);
        size.contains(cell).then_some(cell)
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Number of columns and rows of the grid. Taken from the loaded duty map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub cols: usize,
    pub rows: usize,
}

impl GridSize {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.col < self.cols && cell.row < self.rows
    }
}

/// Maps working-resolution pixel coordinates onto grid cells.
///
/// Cell sizes are integer pixel counts (`frame_width / cols`), and a centroid
/// lying exactly on a boundary belongs to the next cell.
#[derive(Debug, Clone, Copy)]
pub struct GridMapper {
    cell_width: u32,
    cell_height: u32,
    size: GridSize,
}

impl GridMapper {
    /// Fails with `FrameSize` when the frame has fewer pixels than the grid has cells
    /// along either axis.
    pub fn new(frame_width: u32, frame_height: u32, size: GridSize) -> Result<Self> {
        if size.cols == 0 || size.rows == 0 {
            return Err(TrackerError::malformed("grid has no cells"));
        }
        let cell_width = frame_width / size.cols as u32;
        let cell_height = frame_height / size.rows as u32;
        if cell_width == 0 || cell_height == 0 {
            return Err(TrackerError::FrameSize {
                expected: (size.cols as u32, size.rows as u32),
                actual: (frame_width, frame_height),
            });
        }
        Ok(Self {
            cell_width,
            cell_height,
            size,
        })
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Raw `(col, row)` indices of the cell containing `centroid`.
    ///
    /// No range check is made; callers validate against the grid.
    pub fn to_cell(&self, centroid: &Point2<f64>) -> (i64, i64) {
        let col = (centroid.x / self.cell_width as f64).floor() as i64;
        let row = (centroid.y / self.cell_height as f64).floor() as i64;
        (col, row)
    }

    /// Pixel centre of `cell`, used to seed the gating position for a new session.
    pub fn cell_center(&self, cell: GridCell) -> Point2<f64> {
        Point2::new(
            (cell.col as f64 + 0.5) * self.cell_width as f64,
            (cell.row as f64 + 0.5) * self.cell_height as f64,
        )
    }
}
