//! River pixel classification
//!
//! A basin cell is a river cell when its time-mean routed discharge (or any
//! other accumulation layer) reaches a high quantile of the same layer over
//! the basin. The output is a binary raster (1 = river, 0 = not river).

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use surfwat_core::raster::{Raster, RasterCube};
use surfwat_core::{Error, Result};
use tracing::debug;

/// Default quantile of basin discharge above which cells are rivers
pub const DEFAULT_RIVER_QUANTILE: f64 = 0.98;

/// Parameters for river extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiverParams {
    /// Quantile in `[0, 1]` of the basin values used as threshold.
    /// Default: 0.98
    pub quantile: f64,
}

impl Default for RiverParams {
    fn default() -> Self {
        Self {
            quantile: DEFAULT_RIVER_QUANTILE,
        }
    }
}

impl RiverParams {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quantile) {
            return Err(Error::InvalidParameter {
                name: "quantile",
                value: self.quantile.to_string(),
                reason: "must lie in [0, 1]".into(),
            });
        }
        Ok(())
    }
}

/// Quantile of `values` with linear interpolation between closest ranks.
///
/// `values` is sorted in place. Returns `None` for an empty slice.
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// Extract rivers from a routed discharge cube using its time mean.
///
/// # Arguments
/// * `routed_discharge` - Routed discharge (from [`route`](super::route))
/// * `basin` - Basin mask
/// * `params` - Threshold quantile
///
/// # Returns
/// Raster<u8> with 1 = river cell, 0 elsewhere
pub fn extract_rivers(
    routed_discharge: &RasterCube<f64>,
    basin: &Raster<u8>,
    params: RiverParams,
) -> Result<Raster<u8>> {
    basin.ensure_shape(routed_discharge.grid_shape())?;
    let mean = basin.with_data(routed_discharge.time_mean());
    extract_rivers_from(&mean, basin, params)
}

/// Extract rivers from a single accumulation layer (mean discharge or
/// accumulated pixels).
///
/// A basin cell is a river cell when its value is positive and at least the
/// `params.quantile` quantile of all finite basin values. Using `>=` keeps
/// the basin maximum (the main outlet) in the network on small grids.
///
/// # Errors
/// [`Error::NoRiverNetworkFound`] when the basin is empty or no cell qualifies.
pub fn extract_rivers_from(
    values: &Raster<f64>,
    basin: &Raster<u8>,
    params: RiverParams,
) -> Result<Raster<u8>> {
    params.validate()?;
    values.ensure_shape(basin.shape())?;
    let (rows, cols) = values.shape();

    let mut samples: Vec<f64> = values
        .data()
        .indexed_iter()
        .filter(|&((r, c), _)| basin.is_set(r, c))
        .filter_map(|(_, &v)| (!values.is_nodata(v)).then_some(v))
        .collect();

    let threshold = quantile(&mut samples, params.quantile)
        .ok_or_else(|| Error::NoRiverNetworkFound("basin has no valid cells".into()))?;

    let mut rivers = Array2::<u8>::zeros((rows, cols));
    let mut count = 0usize;
    for ((r, c), &v) in values.data().indexed_iter() {
        if basin.is_set(r, c) && !values.is_nodata(v) && v > 0.0 && v >= threshold {
            rivers[(r, c)] = 1;
            count += 1;
        }
    }

    if count == 0 {
        return Err(Error::NoRiverNetworkFound(format!(
            "no basin cell above threshold {}",
            threshold
        )));
    }

    debug!(threshold, river_cells = count, "extracted rivers");

    let mut output = values.with_data(rivers);
    output.set_nodata(None);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_relative_eq!(quantile(&mut v, 0.5).unwrap(), 3.0);
        assert_relative_eq!(quantile(&mut v, 0.98).unwrap(), 4.92, epsilon = 1e-12);
        assert_relative_eq!(quantile(&mut v, 1.0).unwrap(), 5.0);
        assert!(quantile(&mut [], 0.5).is_none());
    }

    #[test]
    fn test_threshold_keeps_top_cells() {
        // Mean discharge along a south chain: 1, 2, 3 per column
        let values =
            Raster::from_vec(vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0], 3, 3).unwrap();
        let basin = Raster::filled(3, 3, 1u8);

        let rivers = extract_rivers_from(&values, &basin, RiverParams::default()).unwrap();
        assert_eq!(rivers.count_where(|v| v == 1), 3);
        for col in 0..3 {
            assert_eq!(rivers.get(2, col).unwrap(), 1);
        }

        let rivers = extract_rivers_from(&values, &basin, RiverParams { quantile: 0.3 }).unwrap();
        assert_eq!(rivers.count_where(|v| v == 1), 6);
    }

    #[test]
    fn test_cells_outside_basin_never_rivers() {
        let values = Raster::from_vec(vec![10.0, 1.0, 1.0, 1.0], 2, 2).unwrap();
        let basin = Raster::from_vec(vec![0u8, 1, 1, 1], 2, 2).unwrap();
        let rivers = extract_rivers_from(&values, &basin, RiverParams::default()).unwrap();
        assert_eq!(rivers.get(0, 0).unwrap(), 0);
        assert_eq!(rivers.count_where(|v| v == 1), 3);
    }

    #[test]
    fn test_dry_basin_has_no_rivers() {
        let values = Raster::new(3, 3);
        let basin = Raster::filled(3, 3, 1u8);
        let err = extract_rivers_from(&values, &basin, RiverParams::default()).unwrap_err();
        assert!(matches!(err, Error::NoRiverNetworkFound(_)));

        let empty = Raster::new(3, 3);
        let values = Raster::filled(3, 3, 1.0);
        let err = extract_rivers_from(&values, &empty, RiverParams::default()).unwrap_err();
        assert!(matches!(err, Error::NoRiverNetworkFound(_)));
    }

    #[test]
    fn test_rejects_bad_quantile() {
        let values = Raster::filled(2, 2, 1.0);
        let basin = Raster::filled(2, 2, 1u8);
        let err = extract_rivers_from(&values, &basin, RiverParams { quantile: 1.5 }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "quantile", .. }));
    }

    #[test]
    fn test_extract_from_cube_uses_time_mean() {
        let mut data = vec![0.0; 8];
        data[3] = 4.0; // t=0, cell (1,1)
        data[7] = 2.0; // t=1, cell (1,1)
        data[2] = 1.0;
        let cube = RasterCube::from_vec(data, 2, 2, 2).unwrap();
        let basin = Raster::filled(2, 2, 1u8);

        let rivers = extract_rivers(&cube, &basin, RiverParams::default()).unwrap();
        assert_eq!(rivers.get(1, 1).unwrap(), 1);
        assert_eq!(rivers.count_where(|v| v == 1), 1);
    }
}
