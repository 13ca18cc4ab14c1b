//! Per-reach value buffers
//!
//! Reach values live in one contiguous buffer; a [`ReachLayout`] maps each
//! reach to its slice. Profiles hold one value per reach pixel, series hold
//! one value per time step and reach pixel.

use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use surfwat_core::raster::RasterCube;
use surfwat_core::{Error, Result};

use super::network::{ReachId, ReachNetwork};

/// Offsets of every reach in a flat per-pixel buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachLayout {
    offsets: Vec<usize>,
}

impl ReachLayout {
    pub fn from_network(network: &ReachNetwork) -> Self {
        let mut offsets = Vec::with_capacity(network.len() + 1);
        offsets.push(0);
        for reach in network.reaches() {
            offsets.push(offsets[offsets.len() - 1] + reach.len());
        }
        Self { offsets }
    }

    /// Number of reaches
    pub fn reaches(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of reach pixels, shared confluences counted once per reach
    pub fn total_len(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Buffer range of a reach
    pub fn range(&self, id: ReachId) -> Range<usize> {
        self.offsets[id]..self.offsets[id + 1]
    }

    fn check(&self, id: ReachId) -> Result<()> {
        if id >= self.reaches() {
            return Err(Error::Algorithm(format!("unknown reach {}", id)));
        }
        Ok(())
    }
}

/// One value per reach pixel (elevation, distance)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachProfile {
    layout: ReachLayout,
    values: Vec<f64>,
}

impl ReachProfile {
    pub fn zeros(layout: ReachLayout) -> Self {
        let values = vec![0.0; layout.total_len()];
        Self { layout, values }
    }

    pub fn layout(&self) -> &ReachLayout {
        &self.layout
    }

    /// Values of a reach, downstream end first
    pub fn reach(&self, id: ReachId) -> Result<&[f64]> {
        self.layout.check(id)?;
        Ok(&self.values[self.layout.range(id)])
    }

    pub fn reach_mut(&mut self, id: ReachId) -> Result<&mut [f64]> {
        self.layout.check(id)?;
        let range = self.layout.range(id);
        Ok(&mut self.values[range])
    }

    /// Every reach's values, in reach order
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.layout.reaches()).map(move |id| &self.values[self.layout.range(id)])
    }
}

/// A time series per reach pixel, stored as `[time, pixel]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachSeries {
    layout: ReachLayout,
    values: Array2<f64>,
}

impl ReachSeries {
    pub fn zeros(layout: ReachLayout, time_steps: usize) -> Self {
        let values = Array2::zeros((time_steps, layout.total_len()));
        Self { layout, values }
    }

    /// Sample a `[time, row, col]` cube at every reach pixel.
    ///
    /// No-data and NaN samples become 0.
    pub fn from_cube(network: &ReachNetwork, cube: &RasterCube<f64>) -> Result<Self> {
        let (rows, cols) = network.shape();
        let (ar, ac) = cube.grid_shape();
        if (rows, cols) != (ar, ac) {
            return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
        }

        let layout = ReachLayout::from_network(network);
        let mut series = Self::zeros(layout, cube.time_steps());
        for reach in network.reaches() {
            let range = series.layout.range(reach.id);
            for (k, pixel) in range.zip(&reach.pixels) {
                let (r, c) = pixel.row_col(cols);
                for t in 0..cube.time_steps() {
                    series.values[(t, k)] = cube.valid(t, r, c).unwrap_or(0.0);
                }
            }
        }
        Ok(series)
    }

    pub fn layout(&self) -> &ReachLayout {
        &self.layout
    }

    pub fn time_steps(&self) -> usize {
        self.values.nrows()
    }

    /// `[time, pixel]` view of a reach
    pub fn reach(&self, id: ReachId) -> Result<ArrayView2<'_, f64>> {
        self.layout.check(id)?;
        Ok(self.values.slice(s![.., self.layout.range(id)]))
    }

    pub fn reach_mut(&mut self, id: ReachId) -> Result<ArrayViewMut2<'_, f64>> {
        self.layout.check(id)?;
        let range = self.layout.range(id);
        Ok(self.values.slice_mut(s![.., range]))
    }

    /// Time series at one pixel of a reach
    pub fn at(&self, id: ReachId, index: usize) -> Result<ArrayView1<'_, f64>> {
        self.layout.check(id)?;
        let range = self.layout.range(id);
        if index >= range.len() {
            return Err(Error::Algorithm(format!(
                "index {} outside reach {} of length {}",
                index,
                id,
                range.len()
            )));
        }
        Ok(self.values.column(range.start + index))
    }

    /// Smallest value over all reaches and time steps
    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    /// Sum over all pixels of every time step
    pub fn totals(&self) -> Array1<f64> {
        self.values.sum_axis(ndarray::Axis(1))
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface_water::network::build_reach_network;
    use surfwat_core::raster::Raster;

    fn chain_network() -> ReachNetwork {
        // 3x1 column flowing south, all river
        let fdir = Raster::filled(3, 1, 4u8);
        let rivers = Raster::filled(3, 1, 1u8);
        let acc = Raster::from_vec(vec![1.0, 2.0, 3.0], 3, 1).unwrap();
        build_reach_network(&fdir, &rivers, &acc).unwrap()
    }

    #[test]
    fn test_series_samples_cube_downstream_first() {
        let network = chain_network();
        let cube = RasterCube::from_vec(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 2, 3, 1).unwrap();
        let series = ReachSeries::from_cube(&network, &cube).unwrap();

        let reach = series.reach(0).unwrap();
        assert_eq!(reach.shape(), &[2, 3]);
        assert_eq!(reach.row(0).to_vec(), vec![3.0, 2.0, 1.0]);
        assert_eq!(reach.row(1).to_vec(), vec![30.0, 20.0, 10.0]);
        assert_eq!(series.at(0, 2).unwrap().to_vec(), vec![1.0, 10.0]);
        assert!(series.at(0, 3).is_err());
        assert_eq!(series.totals().to_vec(), vec![6.0, 60.0]);
    }

    #[test]
    fn test_series_zeroes_nodata_samples() {
        let network = chain_network();
        let mut cube =
            RasterCube::from_vec(vec![-9999.0, 2.0, f64::NAN, 4.0, 5.0, 6.0], 2, 3, 1).unwrap();
        cube.set_nodata(Some(-9999.0));
        let series = ReachSeries::from_cube(&network, &cube).unwrap();

        assert_eq!(series.reach(0).unwrap().row(0).to_vec(), vec![0.0, 2.0, 0.0]);
        assert_eq!(series.reach(0).unwrap().row(1).to_vec(), vec![6.0, 5.0, 4.0]);
        assert_eq!(series.min(), Some(0.0));
    }

    #[test]
    fn test_profile_slices() {
        let network = chain_network();
        let mut profile = ReachProfile::zeros(ReachLayout::from_network(&network));
        profile.reach_mut(0).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(profile.reach(0).unwrap(), &[1.0, 2.0, 3.0]);
        assert!(profile.reach(1).is_err());
        assert_eq!(profile.iter().count(), 1);
    }
}
