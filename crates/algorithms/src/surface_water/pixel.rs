//! Pixel identifiers
//!
//! Every grid cell gets a 1-based row-major id so that 0 is free to mean
//! "no pixel" in id rasters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-major, 1-based identifier of a grid cell: `row * cols + col + 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelId(pub u64);

impl PixelId {
    /// Id of the cell at (row, col) in a grid with `cols` columns
    pub fn new(row: usize, col: usize, cols: usize) -> Self {
        PixelId((row * cols + col + 1) as u64)
    }

    /// Id of the cell at a linear row-major index
    pub fn from_index(index: usize) -> Self {
        PixelId(index as u64 + 1)
    }

    /// Linear row-major index of this cell
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// (row, col) of this cell in a grid with `cols` columns
    pub fn row_col(self, cols: usize) -> (usize, usize) {
        let idx = self.index();
        (idx / cols, idx % cols)
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
