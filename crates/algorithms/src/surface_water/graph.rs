//! Directed graph of river cells
//!
//! Restricts the D8 drainage relation to river cells: an edge `from -> to`
//! exists when river cell `from` drains into river cell `to`.

use surfwat_core::raster::Raster;
use surfwat_core::Result;

use super::direction::{direction_at, receiver};
use super::pixel::PixelId;

/// River cells with their downstream receiver and upstream inflows.
///
/// Storage is compact: only river cells get a slot, looked up by binary
/// search over their ascending linear indices.
#[derive(Debug, Clone)]
pub struct RiverGraph {
    rows: usize,
    cols: usize,
    /// Linear indices of the river cells, ascending
    cells: Vec<usize>,
    /// Per slot: linear index of the downstream river cell
    receivers: Vec<Option<usize>>,
    /// Per slot: upstream river cells, ascending
    inflows: Vec<Vec<usize>>,
    /// Per slot: whether the cell has a defined D8 direction
    has_direction: Vec<bool>,
}

impl RiverGraph {
    /// Build the graph from a direction raster and a binary river raster
    pub fn build(flow_dir: &Raster<u8>, rivers: &Raster<u8>) -> Result<Self> {
        flow_dir.ensure_shape(rivers.shape())?;
        let (rows, cols) = flow_dir.shape();

        let cells: Vec<usize> = (0..rows * cols)
            .filter(|&i| rivers.is_set(i / cols, i % cols))
            .collect();

        let mut graph = Self {
            rows,
            cols,
            receivers: vec![None; cells.len()],
            inflows: vec![Vec::new(); cells.len()],
            has_direction: vec![false; cells.len()],
            cells,
        };

        for slot in 0..graph.cells.len() {
            let idx = graph.cells[slot];
            let (row, col) = (idx / cols, idx % cols);
            graph.has_direction[slot] = direction_at(flow_dir, row, col).is_some();
            if let Some((nr, nc)) = receiver(flow_dir, row, col) {
                let ridx = nr * cols + nc;
                if let Some(rslot) = graph.slot(ridx) {
                    graph.receivers[slot] = Some(ridx);
                    // Slots are visited in ascending order, so inflows stay sorted
                    graph.inflows[rslot].push(idx);
                }
            }
        }

        Ok(graph)
    }

    fn slot(&self, idx: usize) -> Option<usize> {
        self.cells.binary_search(&idx).ok()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of river cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_river(&self, idx: usize) -> bool {
        self.slot(idx).is_some()
    }

    pub fn has_direction(&self, idx: usize) -> bool {
        self.slot(idx).map_or(false, |s| self.has_direction[s])
    }

    /// Downstream river cell of `idx`
    pub fn receiver(&self, idx: usize) -> Option<usize> {
        self.slot(idx).and_then(|s| self.receivers[s])
    }

    /// Upstream river cells draining into `idx`, ascending
    pub fn inflows(&self, idx: usize) -> &[usize] {
        match self.slot(idx) {
            Some(s) => &self.inflows[s],
            None => &[],
        }
    }

    /// Linear indices of all river cells, ascending
    pub fn river_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.iter().copied()
    }

    /// Edge list `(from, to)` of the river graph, ordered by `from`
    pub fn edges(&self) -> Vec<(PixelId, PixelId)> {
        self.cells
            .iter()
            .zip(&self.receivers)
            .filter_map(|(&i, r)| r.map(|r| (PixelId::from_index(i), PixelId::from_index(r))))
            .collect()
    }

    /// 8-connected river neighbours of `idx`, ascending
    pub fn river_neighbours(&self, idx: usize) -> Vec<usize> {
        let (row, col) = (idx / self.cols, idx % self.cols);
        let mut out = Vec::with_capacity(8);
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 || nr >= self.rows as isize || nc >= self.cols as isize {
                    continue;
                }
                let nidx = nr as usize * self.cols + nc as usize;
                if self.is_river(nidx) {
                    out.push(nidx);
                }
            }
        }
        out
    }
}
