//! River reach tree
//!
//! Decomposes the river cells into reaches: maximal runs of river cells
//! between confluences, headwaters and outlets. Reaches are discovered
//! breadth-first from each outlet by walking upstream.
//!
//! Pixel lists run from the downstream end (index 0: the outlet, or the
//! confluence where the reach joins its downstream reach) to the upstream
//! end (a headwater, or the next confluence upstream). A confluence cell
//! therefore appears twice: last in the downstream reach and first in each
//! upstream reach. It is *owned* by the downstream reach, so ownership
//! partitions the river cells.
//!
//! ```text
//!   headwater A   headwater B
//!        \           /
//!     reach 1    reach 2        reach 1 = [C, ..., A]
//!          \       /            reach 2 = [C, ..., B]
//!           C (confluence)      reach 0 = [O, ..., C]
//!           |
//!        reach 0
//!           |
//!           O (outlet)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use surfwat_core::raster::{GeoTransform, Raster};
use surfwat_core::{Error, Result};
use tracing::{debug, info, warn};

use super::graph::RiverGraph;
use super::outlets::{select_outlets, OutletSelection};
use super::pixel::PixelId;

/// Index of a reach in its [`ReachNetwork`]
pub type ReachId = usize;

/// A run of river cells between confluences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reach {
    pub id: ReachId,
    /// Cells from the downstream end to the upstream end
    pub pixels: Vec<PixelId>,
    /// Reach this one flows into
    pub downstream: Option<ReachId>,
    /// Reaches flowing into this one at its upstream end
    pub upstream: Vec<ReachId>,
}

impl Reach {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn is_headwater(&self) -> bool {
        self.upstream.is_empty()
    }

    pub fn is_outlet(&self) -> bool {
        self.downstream.is_none()
    }

    /// Index of the first pixel this reach owns (the shared confluence
    /// at index 0 belongs to the downstream reach)
    pub fn first_owned(&self) -> usize {
        usize::from(self.downstream.is_some())
    }
}

/// Reach tree over the river cells of one grid
#[derive(Debug, Clone)]
pub struct ReachNetwork {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    reaches: Vec<Reach>,
    owners: HashMap<PixelId, (ReachId, usize)>,
    dropped: Vec<(PixelId, PixelId)>,
}

impl ReachNetwork {
    /// Grid shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Number of reaches
    pub fn len(&self) -> usize {
        self.reaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reaches.is_empty()
    }

    /// All reaches, downstream reaches before their upstream reaches
    pub fn reaches(&self) -> &[Reach] {
        &self.reaches
    }

    pub fn reach(&self, id: ReachId) -> Option<&Reach> {
        self.reaches.get(id)
    }

    /// Reaches that drain out of the network
    pub fn outlets(&self) -> impl Iterator<Item = &Reach> + '_ {
        self.reaches.iter().filter(|r| r.is_outlet())
    }

    /// Owning reach and position of a river cell
    pub fn owner(&self, pixel: PixelId) -> Option<(ReachId, usize)> {
        self.owners.get(&pixel).copied()
    }

    /// Every river cell in the network, ascending
    pub fn river_pixels(&self) -> Vec<PixelId> {
        let mut pixels: Vec<PixelId> = self.owners.keys().copied().collect();
        pixels.sort_unstable();
        pixels
    }

    /// Edge artefacts discarded during outlet selection
    pub fn dropped(&self) -> &[(PixelId, PixelId)] {
        &self.dropped
    }

    /// Copy of `rivers` with the dropped edge artefacts cleared, so the
    /// river cells match the cells owned by reaches
    pub fn clear_dropped(&self, rivers: &Raster<u8>) -> Result<Raster<u8>> {
        rivers.ensure_shape(self.shape())?;
        let mut cleared = rivers.clone();
        for (pixel, _) in &self.dropped {
            let (r, c) = pixel.row_col(self.cols);
            cleared.set(r, c, 0)?;
        }
        Ok(cleared)
    }

    /// Reaches strictly downstream of `id`, nearest first
    pub fn downstream_of(&self, id: ReachId) -> DownstreamIter<'_> {
        DownstreamIter {
            network: self,
            next: self.reaches.get(id).and_then(|r| r.downstream),
        }
    }

    /// Reach ids ordered so that every reach comes before its downstream reach
    pub fn upstream_first(&self) -> Vec<ReachId> {
        // Breadth-first discovery gives children larger ids than parents
        (0..self.reaches.len()).rev().collect()
    }

    /// Raster of owning reach ids (-1 off the network)
    pub fn reach_raster(&self) -> Raster<i32> {
        let mut data = Array2::from_elem((self.rows, self.cols), -1i32);
        for (pixel, &(reach, _)) in &self.owners {
            let (r, c) = pixel.row_col(self.cols);
            data[(r, c)] = reach as i32;
        }
        let mut raster = Raster::from_array(data);
        raster.set_transform(self.transform);
        raster.set_nodata(Some(-1));
        raster
    }
}

/// Iterator over the reaches downstream of a reach
#[derive(Debug)]
pub struct DownstreamIter<'a> {
    network: &'a ReachNetwork,
    next: Option<ReachId>,
}

impl<'a> Iterator for DownstreamIter<'a> {
    type Item = &'a Reach;

    fn next(&mut self) -> Option<Self::Item> {
        let reach = self.network.reaches.get(self.next?)?;
        self.next = reach.downstream;
        Some(reach)
    }
}

/// A reach being walked upstream
struct PendingReach {
    pixels: Vec<usize>,
    downstream: Option<ReachId>,
}

/// Build the reach tree of a river raster.
///
/// # Arguments
/// * `flow_dir` - D8 flow direction raster
/// * `rivers` - Binary river raster (from [`extract_rivers`](super::extract_rivers))
/// * `accumulated` - Accumulated pixels, used to rank outlets
///
/// # Errors
/// * [`Error::NoRiverNetworkFound`] when `rivers` has no river cell
/// * [`Error::MalformedFlowNetwork`] when a cell would be visited twice or
///   river cells are not connected to any outlet (a direction cycle)
pub fn build_reach_network(
    flow_dir: &Raster<u8>,
    rivers: &Raster<u8>,
    accumulated: &Raster<f64>,
) -> Result<ReachNetwork> {
    let graph = RiverGraph::build(flow_dir, rivers)?;
    let (rows, cols) = graph.shape();

    let river_count = graph.len();
    if river_count == 0 {
        return Err(Error::NoRiverNetworkFound("river raster is empty".into()));
    }

    let OutletSelection { outlets, dropped } = select_outlets(&graph, accumulated)?;
    if !dropped.is_empty() {
        warn!(count = dropped.len(), "dropped edge outlet artefacts");
    }

    let mut visited: HashSet<usize> = HashSet::with_capacity(river_count);
    let mut reaches: Vec<Reach> = Vec::new();
    let mut queue: VecDeque<PendingReach> = VecDeque::new();

    let visit = |visited: &mut HashSet<usize>, idx: usize| -> Result<()> {
        if !visited.insert(idx) {
            return Err(Error::malformed(format!(
                "river cell {} reached twice while building reaches",
                PixelId::from_index(idx)
            )));
        }
        Ok(())
    };

    for outlet in outlets {
        visit(&mut visited, outlet.index())?;
        queue.push_back(PendingReach {
            pixels: vec![outlet.index()],
            downstream: None,
        });

        while let Some(PendingReach {
            mut pixels,
            downstream,
        }) = queue.pop_front()
        {
            let mut current = *pixels.last().unwrap_or(&outlet.index());
            loop {
                match graph.inflows(current) {
                    [single] => {
                        visit(&mut visited, *single)?;
                        pixels.push(*single);
                        current = *single;
                    }
                    _ => break,
                }
            }

            let id = reaches.len();
            if let Some(down) = downstream {
                reaches[down].upstream.push(id);
            }
            reaches.push(Reach {
                id,
                pixels: pixels.into_iter().map(PixelId::from_index).collect(),
                downstream,
                upstream: Vec::new(),
            });

            let inflows = graph.inflows(current);
            if inflows.len() >= 2 {
                for &up in inflows {
                    visit(&mut visited, up)?;
                    queue.push_back(PendingReach {
                        pixels: vec![current, up],
                        downstream: Some(id),
                    });
                }
            }
        }
    }

    let unvisited = graph.river_cells().filter(|i| !visited.contains(i)).count();
    if unvisited > dropped.len() {
        return Err(Error::malformed(format!(
            "{} river cells do not drain to any outlet",
            unvisited - dropped.len()
        )));
    }

    let mut owners = HashMap::with_capacity(river_count);
    for reach in &reaches {
        for (pos, &pixel) in reach.pixels.iter().enumerate().skip(reach.first_owned()) {
            owners.insert(pixel, (reach.id, pos));
        }
    }

    debug!(
        reaches = reaches.len(),
        river_cells = owners.len(),
        "built reach network"
    );
    info!(
        reaches = reaches.len(),
        outlets = reaches.iter().filter(|r| r.is_outlet()).count(),
        "river network ready"
    );

    Ok(ReachNetwork {
        rows,
        cols,
        transform: *flow_dir.transform(),
        reaches,
        owners,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 grid with two headwaters joining above a single outlet
    ///
    /// ```text
    ///  r\c  0    1    2
    ///  0    2    .    8       (0,0) -> SE, (0,2) -> SW
    ///  1    .    4    .       (1,1) confluence -> S
    ///  2    .    4    .
    ///  3    .    4    .       (3,1) outlet, flows off the grid
    /// ```
    fn y_network() -> (Raster<u8>, Raster<u8>, Raster<f64>) {
        let fdir = Raster::from_vec(vec![2u8, 0, 8, 0, 4, 0, 0, 4, 0, 0, 4, 0], 4, 3).unwrap();
        let rivers = Raster::from_vec(vec![1u8, 0, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0], 4, 3).unwrap();
        let acc = Raster::from_vec(
            vec![1.0, 0.0, 1.0, 0.0, 3.0, 0.0, 0.0, 4.0, 0.0, 0.0, 5.0, 0.0],
            4,
            3,
        )
        .unwrap();
        (fdir, rivers, acc)
    }

    #[test]
    fn test_clear_dropped_matches_owned_cells() {
        // (2,1) has no direction, no inflow and sits next to the larger outlet (2,0)
        let fdir = Raster::from_vec(vec![4u8, 0, 4, 0, 4, 0], 3, 2).unwrap();
        let rivers = Raster::from_vec(vec![1u8, 0, 1, 0, 1, 1], 3, 2).unwrap();
        let acc = Raster::from_vec(vec![1.0, 0.0, 2.0, 0.0, 3.0, 1.0], 3, 2).unwrap();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();
        assert_eq!(network.dropped(), &[(PixelId(6), PixelId(5))]);

        let cleared = network.clear_dropped(&rivers).unwrap();
        assert_eq!(cleared.get(2, 1).unwrap(), 0);
        let marked: Vec<PixelId> = (0..6)
            .filter(|&i| cleared.get(i / 2, i % 2).unwrap() == 1)
            .map(PixelId::from_index)
            .collect();
        assert_eq!(marked, network.river_pixels());
    }

    #[test]
    fn test_y_network_reaches() {
        let (fdir, rivers, acc) = y_network();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();

        assert_eq!(network.len(), 3);
        let main = network.reach(0).unwrap();
        assert_eq!(main.pixels, vec![PixelId(11), PixelId(8), PixelId(5)]);
        assert_eq!(main.downstream, None);
        assert_eq!(main.upstream, vec![1, 2]);

        assert_eq!(network.reach(1).unwrap().pixels, vec![PixelId(5), PixelId(1)]);
        assert_eq!(network.reach(2).unwrap().pixels, vec![PixelId(5), PixelId(3)]);
        assert_eq!(network.reach(1).unwrap().downstream, Some(0));
        assert!(network.reach(2).unwrap().is_headwater());
    }

    #[test]
    fn test_ownership_partitions_river_cells() {
        let (fdir, rivers, acc) = y_network();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();

        let expected: Vec<PixelId> = rivers
            .data()
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == 1)
            .map(|(i, _)| PixelId::from_index(i))
            .collect();
        assert_eq!(network.river_pixels(), expected);

        // Confluence belongs to the main reach, at its upstream end
        assert_eq!(network.owner(PixelId(5)), Some((0, 2)));
        assert_eq!(network.owner(PixelId(1)), Some((1, 1)));

        let owned: usize = network
            .reaches()
            .iter()
            .map(|r| r.len() - r.first_owned())
            .sum();
        assert_eq!(owned, expected.len());
    }

    #[test]
    fn test_every_reach_end_links_to_upstream_starts() {
        let (fdir, rivers, acc) = y_network();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();

        for reach in network.reaches() {
            if let Some(down) = reach.downstream {
                let parent = network.reach(down).unwrap();
                assert_eq!(parent.pixels.last(), reach.pixels.first());
            }
        }
    }

    #[test]
    fn test_downstream_chain_and_order() {
        let (fdir, rivers, acc) = y_network();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();

        let chain: Vec<ReachId> = network.downstream_of(2).map(|r| r.id).collect();
        assert_eq!(chain, vec![0]);
        assert_eq!(network.downstream_of(0).count(), 0);

        let order = network.upstream_first();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(1) < pos(0));
        assert!(pos(2) < pos(0));
    }

    #[test]
    fn test_reach_raster_labels_owners() {
        let (fdir, rivers, acc) = y_network();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();
        let labels = network.reach_raster();

        assert_eq!(labels.get(1, 1).unwrap(), 0);
        assert_eq!(labels.get(0, 0).unwrap(), 1);
        assert_eq!(labels.get(0, 2).unwrap(), 2);
        assert_eq!(labels.get(0, 1).unwrap(), -1);
    }

    #[test]
    fn test_single_cell_network() {
        let fdir = Raster::filled(1, 1, 0u8);
        let rivers = Raster::filled(1, 1, 1u8);
        let acc = Raster::filled(1, 1, 1.0);
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();
        assert_eq!(network.len(), 1);
        assert_eq!(network.reach(0).unwrap().pixels, vec![PixelId(1)]);
    }

    #[test]
    fn test_outlet_confluence_gives_one_cell_reach() {
        // (0,0) -> E and (0,2) -> W both drain into (0,1), which exits north
        let fdir = Raster::from_vec(vec![1u8, 64, 16], 1, 3).unwrap();
        let rivers = Raster::filled(1, 3, 1u8);
        let acc = Raster::from_vec(vec![1.0, 3.0, 1.0], 1, 3).unwrap();
        let network = build_reach_network(&fdir, &rivers, &acc).unwrap();

        assert_eq!(network.len(), 3);
        assert_eq!(network.reach(0).unwrap().pixels, vec![PixelId(2)]);
        assert_eq!(network.reach(1).unwrap().pixels, vec![PixelId(2), PixelId(1)]);
        assert_eq!(network.reach(2).unwrap().pixels, vec![PixelId(2), PixelId(3)]);
    }

    #[test]
    fn test_cycle_is_malformed() {
        // River loop with no outlet
        let fdir = Raster::from_vec(vec![1u8, 4, 64, 16], 2, 2).unwrap();
        let rivers = Raster::filled(2, 2, 1u8);
        let acc = Raster::filled(2, 2, 1.0);
        let err = build_reach_network(&fdir, &rivers, &acc).unwrap_err();
        assert!(matches!(err, Error::MalformedFlowNetwork { .. }));
    }

    #[test]
    fn test_empty_rivers() {
        let fdir = Raster::filled(2, 2, 4u8);
        let rivers = Raster::new(2, 2);
        let acc = Raster::filled(2, 2, 1.0);
        assert!(matches!(
            build_reach_network(&fdir, &rivers, &acc),
            Err(Error::NoRiverNetworkFound(_))
        ));
    }
}
