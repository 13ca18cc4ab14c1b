//! Outlet selection for the river network
//!
//! An outlet is a river cell with no downstream river cell: its flow
//! leaves the grid, the basin, or the river network, or it has no
//! direction at all.
//!
//! Basin edges produce a typical artefact: an isolated river cell with an
//! undefined direction sitting next to the real, higher-accumulation outlet.
//! Such a candidate (no direction, no river inflow, a river neighbour with
//! strictly larger accumulated pixels) is dropped instead of becoming a
//! one-cell network of its own; the flow is credited to the neighbour.
//!
//! Outlets are ordered by descending accumulated pixels, ties broken by
//! ascending [`PixelId`], so the main stem always comes first.

use std::cmp::Ordering;

use surfwat_core::raster::Raster;
use surfwat_core::Result;
use tracing::debug;

use super::graph::RiverGraph;
use super::pixel::PixelId;

/// Outlets of a river network and the edge artefacts that were discarded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutletSelection {
    /// Network roots, main outlet first
    pub outlets: Vec<PixelId>,
    /// Artefact cells removed from the network, with the neighbour they were nudged to
    pub dropped: Vec<(PixelId, PixelId)>,
}

/// Select outlets from a river graph and its accumulation layer
pub fn select_outlets(graph: &RiverGraph, accumulated: &Raster<f64>) -> Result<OutletSelection> {
    accumulated.ensure_shape(graph.shape())?;
    let cols = graph.shape().1;
    let acc = |idx: usize| {
        accumulated
            .valid(idx / cols, idx % cols)
            .unwrap_or(0.0)
    };

    let mut outlets = Vec::new();
    let mut dropped = Vec::new();

    for idx in graph.river_cells() {
        if graph.receiver(idx).is_some() {
            continue;
        }

        if !graph.has_direction(idx) && graph.inflows(idx).is_empty() {
            let own = acc(idx);
            // Highest neighbour; ascending scan keeps the first one on ties
            let nudge = graph
                .river_neighbours(idx)
                .into_iter()
                .filter(|&n| acc(n) > own)
                .fold(None::<usize>, |best, n| match best {
                    Some(b) if acc(b) >= acc(n) => Some(b),
                    _ => Some(n),
                });
            if let Some(target) = nudge {
                debug!(
                    cell = %PixelId::from_index(idx),
                    target = %PixelId::from_index(target),
                    "dropping edge outlet artefact"
                );
                dropped.push((PixelId::from_index(idx), PixelId::from_index(target)));
                continue;
            }
        }

        outlets.push(idx);
    }

    outlets.sort_by(|&a, &b| {
        acc(b)
            .partial_cmp(&acc(a))
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    Ok(OutletSelection {
        outlets: outlets.into_iter().map(PixelId::from_index).collect(),
        dropped,
    })
}
