//! Duty-ratio policy map: one ratio in [-1, 1] per grid cell.
//!
//! The on-disk format is a headerless comma-separated table, one grid row per
//! line, read and written row-major.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::grid::{GridCell, GridSize};

/// Lowest accepted duty ratio (full reverse).
pub const MIN_DUTY: f64 = -1.0;
/// Highest accepted duty ratio (full forward).
pub const MAX_DUTY: f64 = 1.0;

/// Fails with `DutyOutOfRange` unless `value` lies in [-1, 1].
pub fn validate_duty(value: f64) -> Result<f64> {
    if (MIN_DUTY..=MAX_DUTY).contains(&value) {
        Ok(value)
    } else {
        Err(TrackerError::DutyOutOfRange { value })
    }
}

/// Rectangular grid of duty ratios, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DutyMap {
    width: usize,
    height: usize,
    cells: Vec<f64>,
}

impl DutyMap {
    /// A `width` x `height` map with every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: f64) -> Result<Self> {
        validate_duty(value)?;
        if width == 0 || height == 0 {
            return Err(TrackerError::malformed(format!(
                "duty map must have at least one cell, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            cells: vec![value; width * height],
        })
    }

    /// Build a map from parsed rows, enforcing equal row lengths and the duty range.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = match rows.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(TrackerError::malformed("table is empty")),
        };

        let height = rows.len();
        let mut cells = Vec::with_capacity(width * height);
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TrackerError::malformed(format!(
                    "row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    width
                )));
            }
            for value in row {
                cells.push(validate_duty(value)?);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Parse a table from any reader.
    pub fn load_from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (row_idx, rec) in rdr.records().enumerate() {
            let rec = rec?;
            let mut row = Vec::with_capacity(rec.len());
            for (col_idx, field) in rec.iter().enumerate() {
                let value: f64 = field.trim().parse().map_err(|_| {
                    TrackerError::malformed(format!(
                        "value {:?} at row {}, column {} is not a number",
                        field, row_idx, col_idx
                    ))
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        Self::from_rows(rows)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let map = Self::load_from_reader(File::open(path)?)?;
        debug!(
            "Loaded {}x{} duty map from {}",
            map.width,
            map.height,
            path.display()
        );
        Ok(map)
    }

    /// Serialize row-major in the same table format `load_from_reader` accepts.
    pub fn save_to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
        for row in self.rows() {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save_to_writer(File::create(path.as_ref())?)
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn grid_size(&self) -> GridSize {
        GridSize::new(self.width, self.height)
    }

    /// Duty ratio at `(col, row)`.
    ///
    /// # Panics
    /// If the index lies outside the map. Callers validate cells against
    /// [`DutyMap::grid_size`] first.
    pub fn get(&self, col: usize, row: usize) -> f64 {
        assert!(
            col < self.width && row < self.height,
            "duty map index ({}, {}) out of bounds for {}x{} map",
            col,
            row,
            self.width,
            self.height
        );
        self.cells[row * self.width + col]
    }

    pub fn get_cell(&self, cell: GridCell) -> f64 {
        self.get(cell.col, cell.row)
    }

    /// Overwrite one cell. Fails with `DutyOutOfRange` without touching the map.
    ///
    /// # Panics
    /// If the index lies outside the map.
    pub fn set(&mut self, col: usize, row: usize, value: f64) -> Result<()> {
        let value = validate_duty(value)?;
        assert!(
            col < self.width && row < self.height,
            "duty map index ({}, {}) out of bounds for {}x{} map",
            col,
            row,
            self.width,
            self.height
        );
        self.cells[row * self.width + col] = value;
        Ok(())
    }

    /// Rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks(self.width)
    }
}
