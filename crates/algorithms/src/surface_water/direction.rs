//! D8 flow direction model
//!
//! Flow directions use the HydroSHEDS power-of-two encoding, clockwise
//! from east:
//!
//! ```text
//!  32  64  128
//!  16   x    1
//!   8   4    2
//! ```
//!
//! `0` (or the raster's no-data value) means the cell has no defined
//! outflow: it lies outside the basin or is a sink.

use surfwat_core::raster::Raster;
use surfwat_core::{Error, Result};

/// One of the eight D8 neighbours a cell can drain into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D8 {
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
}

/// Geometric class of a single D8 step, used for river lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepClass {
    /// East or west
    Horizontal,
    /// North or south
    Vertical,
    /// Any of the four corners
    Diagonal,
}

impl D8 {
    /// All directions in encoding order
    pub const ALL: [D8; 8] = [
        D8::East,
        D8::SouthEast,
        D8::South,
        D8::SouthWest,
        D8::West,
        D8::NorthWest,
        D8::North,
        D8::NorthEast,
    ];

    /// Decode a direction code. `None` for 0 and for unknown codes.
    pub fn from_code(code: u8) -> Option<D8> {
        match code {
            1 => Some(D8::East),
            2 => Some(D8::SouthEast),
            4 => Some(D8::South),
            8 => Some(D8::SouthWest),
            16 => Some(D8::West),
            32 => Some(D8::NorthWest),
            64 => Some(D8::North),
            128 => Some(D8::NorthEast),
            _ => None,
        }
    }

    /// Encoded value of this direction
    pub fn code(self) -> u8 {
        match self {
            D8::East => 1,
            D8::SouthEast => 2,
            D8::South => 4,
            D8::SouthWest => 8,
            D8::West => 16,
            D8::NorthWest => 32,
            D8::North => 64,
            D8::NorthEast => 128,
        }
    }

    /// (row, col) offset to the receiving neighbour
    pub fn offset(self) -> (isize, isize) {
        match self {
            D8::East => (0, 1),
            D8::SouthEast => (1, 1),
            D8::South => (1, 0),
            D8::SouthWest => (1, -1),
            D8::West => (0, -1),
            D8::NorthWest => (-1, -1),
            D8::North => (-1, 0),
            D8::NorthEast => (-1, 1),
        }
    }

    pub fn step_class(self) -> StepClass {
        match self {
            D8::East | D8::West => StepClass::Horizontal,
            D8::North | D8::South => StepClass::Vertical,
            _ => StepClass::Diagonal,
        }
    }

    /// Neighbour of (row, col) in this direction, `None` when it falls off the grid
    pub fn neighbour(
        self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }
}

/// Whether `code` is 0 or one of the eight direction codes
pub fn is_valid_code(code: u8) -> bool {
    code == 0 || D8::from_code(code).is_some()
}

/// Direction of the cell at (row, col); `None` for no-data, 0 and unknown codes
pub fn direction_at(flow_dir: &Raster<u8>, row: usize, col: usize) -> Option<D8> {
    flow_dir.valid(row, col).and_then(D8::from_code)
}

/// Cell that (row, col) drains into, if its direction is defined and the
/// receiver lies on the grid
pub fn receiver(flow_dir: &Raster<u8>, row: usize, col: usize) -> Option<(usize, usize)> {
    let (rows, cols) = flow_dir.shape();
    direction_at(flow_dir, row, col)?.neighbour(row, col, rows, cols)
}

/// Check that every basin cell carries a known D8 code.
///
/// No-data cells are accepted and treated as "no flow".
///
/// # Errors
/// [`Error::SizeMismatch`] when the basin does not match the direction grid,
/// [`Error::MalformedFlowNetwork`] naming the first offending cell otherwise.
pub fn validate_flow_direction(flow_dir: &Raster<u8>, basin: &Raster<u8>) -> Result<()> {
    flow_dir.ensure_shape(basin.shape())?;
    if flow_dir.is_empty() {
        return Err(Error::InvalidDimensions {
            width: flow_dir.cols(),
            height: flow_dir.rows(),
        });
    }

    for ((row, col), &code) in flow_dir.data().indexed_iter() {
        if !basin.is_set(row, col) || flow_dir.is_nodata(code) {
            continue;
        }
        if !is_valid_code(code) {
            return Err(Error::malformed(format!(
                "invalid D8 code {} at ({}, {})",
                code, row, col
            )));
        }
    }
    Ok(())
}
