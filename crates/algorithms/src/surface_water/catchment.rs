//! Catchment assignment
//!
//! Every basin cell is attached to its nearest river cell (Euclidean
//! distance in cell units), which decides where water withdrawn at that
//! cell is taken from the river. Lookups go through a 2D k-d tree over the
//! river cells; equidistant river cells resolve to the lowest [`PixelId`].

use ndarray::Array2;
use surfwat_core::raster::Raster;
use surfwat_core::{Error, Result};
use tracing::debug;

use super::network::ReachNetwork;
use super::pixel::PixelId;

/// A 2D k-d tree over river cell positions
#[derive(Debug)]
pub struct RiverIndex {
    nodes: Vec<KdNode>,
    /// (row, col, id) in tree order
    points: Vec<(f64, f64, PixelId)>,
}

#[derive(Debug)]
struct KdNode {
    point_idx: usize,
    /// 0 = row, 1 = col
    split_dim: u8,
    left: Option<usize>,
    right: Option<usize>,
}

impl RiverIndex {
    /// Index the river cells of a network
    pub fn build(network: &ReachNetwork) -> Self {
        let cols = network.shape().1;
        let points: Vec<(f64, f64, PixelId)> = network
            .river_pixels()
            .into_iter()
            .map(|id| {
                let (r, c) = id.row_col(cols);
                (r as f64, c as f64, id)
            })
            .collect();

        let mut nodes = Vec::with_capacity(points.len());
        if !points.is_empty() {
            let mut indices: Vec<usize> = (0..points.len()).collect();
            build_recursive(&points, &mut indices, 0, &mut nodes);
        }
        Self { nodes, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Nearest river cell to (row, col) and its squared distance
    pub fn nearest(&self, row: usize, col: usize) -> Option<(PixelId, f64)> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best = (f64::MAX, PixelId(u64::MAX));
        self.nearest_recursive(0, row as f64, col as f64, &mut best);
        Some((best.1, best.0))
    }

    fn nearest_recursive(&self, node_idx: usize, qr: f64, qc: f64, best: &mut (f64, PixelId)) {
        let node = &self.nodes[node_idx];
        let (pr, pc, id) = self.points[node.point_idx];

        let dr = qr - pr;
        let dc = qc - pc;
        let dist_sq = dr * dr + dc * dc;
        if dist_sq < best.0 || (dist_sq == best.0 && id < best.1) {
            *best = (dist_sq, id);
        }

        let diff = if node.split_dim == 0 { dr } else { dc };
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = first {
            self.nearest_recursive(child, qr, qc, best);
        }
        // `<=` so equidistant cells across the split are still compared by id
        if diff * diff <= best.0 {
            if let Some(child) = second {
                self.nearest_recursive(child, qr, qc, best);
            }
        }
    }
}

fn build_recursive(
    points: &[(f64, f64, PixelId)],
    indices: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let split_dim = (depth % 2) as u8;
    let key = |i: usize| if split_dim == 0 { points[i].0 } else { points[i].1 };
    indices.sort_by(|&a, &b| key(a).total_cmp(&key(b)));

    let median = indices.len() / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        point_idx: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    let (left, rest) = indices.split_at_mut(median);
    let right = &mut rest[1..];
    if !left.is_empty() {
        let child = build_recursive(points, left, depth + 1, nodes);
        nodes[node_idx].left = Some(child);
    }
    if !right.is_empty() {
        let child = build_recursive(points, right, depth + 1, nodes);
        nodes[node_idx].right = Some(child);
    }
    node_idx
}

/// Assign every basin cell to its nearest river cell.
///
/// # Arguments
/// * `network` - Reach tree whose river cells are the targets
/// * `basin` - Basin mask; cells outside stay unassigned
/// * `max_radius` - Optional search radius in cells
///
/// # Returns
/// Raster<u64> of [`PixelId`] values, 0 (no-data) for unassigned cells
pub fn assign_catchments(
    network: &ReachNetwork,
    basin: &Raster<u8>,
    max_radius: Option<f64>,
) -> Result<Raster<u64>> {
    basin.ensure_shape(network.shape())?;
    if let Some(radius) = max_radius {
        if !(radius > 0.0) {
            return Err(Error::InvalidParameter {
                name: "max_search_radius",
                value: radius.to_string(),
                reason: "must be positive".into(),
            });
        }
    }
    let max_sq = max_radius.map(|r| r * r);

    let index = RiverIndex::build(network);
    let (rows, cols) = basin.shape();
    let mut ids = Array2::<u64>::zeros((rows, cols));
    let mut unassigned = 0usize;

    for ((r, c), id) in ids.indexed_iter_mut() {
        if !basin.is_set(r, c) {
            continue;
        }
        match index.nearest(r, c) {
            Some((pixel, d)) if max_sq.map_or(true, |m| d <= m) => *id = pixel.0,
            _ => unassigned += 1,
        }
    }

    debug!(river_cells = index.len(), unassigned, "assigned catchments");

    let mut raster = basin.with_data(ids);
    raster.set_nodata(Some(0));
    Ok(raster)
}
