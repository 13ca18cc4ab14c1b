//! Channel routing of runoff volumes
//!
//! Pushes every basin cell's runoff downstream along the D8 directions and
//! accumulates it, together with a unit pixel count, at every cell it passes.
//! Accumulation is inclusive: a headwater cell holds its own pixel and its
//! own runoff.
//!
//! # Algorithm
//! 1. Resolve each basin cell's receiver (the D8 neighbour it drains into,
//!    if that neighbour is also inside the basin)
//! 2. Count in-degrees and order cells topologically (Kahn), headwaters first
//! 3. Walk the order once per time step, adding each cell's total to its
//!    receiver
//!
//! Each cell is visited once per layer, so cost is O(T·R·C) regardless of
//! flow path length. Volume that leaves the basin is dropped. Cells that are
//! never released by the topological sort sit on a cycle, which is reported
//! as [`Error::MalformedFlowNetwork`].

use std::collections::VecDeque;

use ndarray::Array2;
use surfwat_core::raster::{Raster, RasterCube};
use surfwat_core::{Algorithm, Error, Result};
use tracing::debug;

use super::direction::{receiver, validate_flow_direction};
use crate::maybe_rayon::try_map_time_steps;

/// Result of routing a runoff cube over a basin
#[derive(Debug, Clone)]
pub struct RoutingResult {
    /// Number of basin pixels (inclusive) draining through each cell; 0 outside the basin
    pub accumulated_pixels: Raster<f64>,
    /// Runoff volume passing through each cell per time step; 0 outside the basin
    pub routed_discharge: RasterCube<f64>,
    /// Basin cells whose flow leaves the basin, the grid, or stops (sinks)
    pub outlets: Vec<(usize, usize)>,
    /// Number of cells on the longest flow path, minus one
    pub longest_flow_path: usize,
}

/// Drainage graph of the basin cells in topological order
#[derive(Debug)]
struct DrainageOrder {
    /// Linear index of the receiving basin cell, per cell
    receivers: Vec<Option<usize>>,
    /// Basin cells, every cell before its receiver
    order: Vec<usize>,
    /// Basin membership per cell
    in_basin: Vec<bool>,
    longest_path: usize,
}

impl DrainageOrder {
    fn build(flow_dir: &Raster<u8>, basin: &Raster<u8>) -> Result<Self> {
        let (rows, cols) = flow_dir.shape();
        let n = rows * cols;

        let mut in_basin = vec![false; n];
        let mut receivers = vec![None; n];
        let mut in_degree = vec![0u32; n];

        for row in 0..rows {
            for col in 0..cols {
                if !basin.is_set(row, col) {
                    continue;
                }
                let idx = row * cols + col;
                in_basin[idx] = true;

                if let Some((nr, nc)) = receiver(flow_dir, row, col) {
                    if basin.is_set(nr, nc) {
                        let ridx = nr * cols + nc;
                        receivers[idx] = Some(ridx);
                        in_degree[ridx] += 1;
                    }
                }
            }
        }

        let basin_cells = in_basin.iter().filter(|&&b| b).count();
        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&i| in_basin[i] && in_degree[i] == 0)
            .collect();
        let mut depth = vec![0usize; n];
        let mut order = Vec::with_capacity(basin_cells);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            if let Some(ridx) = receivers[idx] {
                depth[ridx] = depth[ridx].max(depth[idx] + 1);
                in_degree[ridx] -= 1;
                if in_degree[ridx] == 0 {
                    queue.push_back(ridx);
                }
            }
        }

        if order.len() != basin_cells {
            let stuck = (0..n)
                .find(|&i| in_basin[i] && in_degree[i] > 0)
                .unwrap_or(0);
            return Err(Error::malformed(format!(
                "flow direction cycle through cell ({}, {}); {} of {} basin cells never drain",
                stuck / cols,
                stuck % cols,
                basin_cells - order.len(),
                basin_cells
            )));
        }

        let longest_path = order.iter().map(|&i| depth[i]).max().unwrap_or(0);

        Ok(Self {
            receivers,
            order,
            in_basin,
            longest_path,
        })
    }

    /// Accumulate a per-cell source layer downstream
    fn accumulate(&self, source: impl Fn(usize) -> f64) -> Vec<f64> {
        let mut total: Vec<f64> = (0..self.in_basin.len())
            .map(|i| if self.in_basin[i] { source(i) } else { 0.0 })
            .collect();

        for &idx in &self.order {
            if let Some(ridx) = self.receivers[idx] {
                total[ridx] += total[idx];
            }
        }
        total
    }
}

/// Route a runoff cube over a basin.
///
/// # Arguments
/// * `runoff` - Runoff volume per cell and time step (m³); no-data counts as 0
/// * `flow_dir` - D8 flow direction raster (HydroSHEDS codes)
/// * `basin` - Basin mask, nonzero inside the area of interest
///
/// # Returns
/// Accumulated pixel counts and routed discharge, both masked to the basin.
///
/// # Errors
/// Shape mismatches, invalid direction codes inside the basin, and cycles.
pub fn route(
    runoff: &RasterCube<f64>,
    flow_dir: &Raster<u8>,
    basin: &Raster<u8>,
) -> Result<RoutingResult> {
    flow_dir.ensure_shape(runoff.grid_shape())?;
    validate_flow_direction(flow_dir, basin)?;

    let (rows, cols) = flow_dir.shape();
    let drainage = DrainageOrder::build(flow_dir, basin)?;

    debug!(
        rows,
        cols,
        basin_cells = drainage.order.len(),
        time_steps = runoff.time_steps(),
        longest_flow_path = drainage.longest_path,
        "routing runoff"
    );

    let pixels = drainage.accumulate(|_| 1.0);
    let accumulated = Array2::from_shape_vec((rows, cols), pixels)
        .map_err(|e| Error::Other(e.to_string()))?;

    let layers = try_map_time_steps(runoff.time_steps(), |t| {
        let routed = drainage.accumulate(|i| runoff.valid(t, i / cols, i % cols).unwrap_or(0.0));
        let layer = Array2::from_shape_vec((rows, cols), routed)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(flow_dir.with_data(layer))
    })?;

    let routed_discharge = if layers.is_empty() {
        let mut empty = RasterCube::new(0, rows, cols);
        empty.set_transform(*flow_dir.transform());
        empty.set_crs(flow_dir.crs().cloned());
        empty
    } else {
        RasterCube::stack(&layers)?
    };

    let outlets = (0..rows * cols)
        .filter(|&i| drainage.in_basin[i] && drainage.receivers[i].is_none())
        .map(|i| (i / cols, i % cols))
        .collect();

    let accumulated_pixels = flow_dir.with_data(accumulated);

    Ok(RoutingResult {
        accumulated_pixels,
        routed_discharge,
        outlets,
        longest_flow_path: drainage.longest_path,
    })
}

/// Inputs of [`FlowRouting`]
#[derive(Debug, Clone)]
pub struct RoutingInput {
    pub runoff: RasterCube<f64>,
    pub flow_dir: Raster<u8>,
    pub basin: Raster<u8>,
}

/// Channel routing algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowRouting;

impl Algorithm for FlowRouting {
    type Input = RoutingInput;
    type Output = RoutingResult;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Routing"
    }

    fn description(&self) -> &'static str {
        "Route runoff volumes downstream along D8 flow directions"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        route(&input.runoff, &input.flow_dir, &input.basin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn south_chain() -> (Raster<u8>, Raster<u8>) {
        // Rows 0-1 flow south, row 2 flows off the grid
        let fdir = Raster::from_vec(vec![4u8, 4, 4, 4, 4, 4, 4, 4, 4], 3, 3).unwrap();
        let basin = Raster::filled(3, 3, 1u8);
        (fdir, basin)
    }

    #[test]
    fn test_south_chain_accumulates_three_per_column() {
        let (fdir, basin) = south_chain();
        let runoff = RasterCube::from_vec(vec![1.0; 9], 1, 3, 3).unwrap();

        let result = route(&runoff, &fdir, &basin).unwrap();

        for col in 0..3 {
            assert_eq!(result.accumulated_pixels.get(0, col).unwrap(), 1.0);
            assert_eq!(result.accumulated_pixels.get(1, col).unwrap(), 2.0);
            assert_eq!(result.accumulated_pixels.get(2, col).unwrap(), 3.0);
            assert_relative_eq!(result.routed_discharge.data()[(0, 2, col)], 3.0);
        }
        assert_eq!(result.outlets, vec![(2, 0), (2, 1), (2, 2)]);
        assert_eq!(result.longest_flow_path, 2);
    }

    #[test]
    fn test_outlet_discharge_conserves_mass() {
        // Two branches joining at the bottom-right cell
        //   1  1  4
        //   1  1  4
        //   1  1  0
        let fdir = Raster::from_vec(vec![1u8, 1, 4, 1, 1, 4, 1, 1, 0], 3, 3).unwrap();
        let basin = Raster::filled(3, 3, 1u8);
        let runoff =
            RasterCube::from_vec((1..=18).map(|v| v as f64).collect(), 2, 3, 3).unwrap();

        let result = route(&runoff, &fdir, &basin).unwrap();
        assert_eq!(result.outlets, vec![(2, 2)]);
        assert_eq!(result.accumulated_pixels.get(2, 2).unwrap(), 9.0);

        for t in 0..2 {
            let input: f64 = runoff.layer(t).unwrap().sum();
            let at_outlet = result.routed_discharge.data()[(t, 2, 2)];
            assert_relative_eq!(at_outlet, input, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cells_outside_basin_are_masked() {
        let (fdir, mut basin) = south_chain();
        basin.set(0, 1, 0).unwrap();
        let runoff = RasterCube::from_vec(vec![2.0; 9], 1, 3, 3).unwrap();

        let result = route(&runoff, &fdir, &basin).unwrap();
        assert_eq!(result.accumulated_pixels.get(0, 1).unwrap(), 0.0);
        assert_eq!(result.accumulated_pixels.get(2, 1).unwrap(), 2.0);
        assert_relative_eq!(result.routed_discharge.data()[(0, 2, 1)], 4.0);
        assert_relative_eq!(result.routed_discharge.data()[(0, 0, 1)], 0.0);
    }

    #[test]
    fn test_runoff_nodata_counts_as_zero() {
        let (fdir, basin) = south_chain();
        let mut runoff = RasterCube::from_vec(vec![1.0; 9], 1, 3, 3).unwrap();
        runoff.set_nodata(Some(-9999.0));
        runoff.data_mut()[(0, 0, 0)] = -9999.0;
        runoff.data_mut()[(0, 1, 0)] = f64::NAN;

        let result = route(&runoff, &fdir, &basin).unwrap();
        assert_relative_eq!(result.routed_discharge.data()[(0, 2, 0)], 1.0);
        assert_eq!(result.accumulated_pixels.get(2, 0).unwrap(), 3.0);
    }

    #[test]
    fn test_cycle_is_reported() {
        // (0,0) -> (0,1) -> (1,1) -> (1,0) -> (0,0)
        let fdir = Raster::from_vec(vec![1u8, 4, 64, 16], 2, 2).unwrap();
        let basin = Raster::filled(2, 2, 1u8);
        let runoff = RasterCube::new(1, 2, 2);

        let err = route(&runoff, &fdir, &basin).unwrap_err();
        assert!(matches!(err, Error::MalformedFlowNetwork { .. }));
    }

    #[test]
    fn test_shape_mismatch() {
        let (fdir, basin) = south_chain();
        let runoff = RasterCube::new(1, 2, 3);
        assert!(matches!(
            route(&runoff, &fdir, &basin),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_algorithm_trait() {
        let (flow_dir, basin) = south_chain();
        let runoff = RasterCube::from_vec(vec![1.0; 9], 1, 3, 3).unwrap();
        let result = FlowRouting
            .execute_default(RoutingInput { runoff, flow_dir, basin })
            .unwrap();
        assert_eq!(result.accumulated_pixels.get(2, 2).unwrap(), 3.0);
    }
}
