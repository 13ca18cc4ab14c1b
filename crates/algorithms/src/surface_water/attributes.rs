//! Reach distance and elevation profiles
//!
//! Walks every reach from its downstream end upstream:
//! - `distance[k]` is the river length from the network outlet to pixel `k`
//! - `elevation[k]` is the running maximum of the DEM along the same path,
//!   so a profile never rises when followed downstream
//!
//! A reach starts from the values its downstream reach holds at the shared
//! confluence; outlet reaches start at 0 m and the outlet's own elevation.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use surfwat_core::raster::Raster;
use surfwat_core::{Error, Result};
use tracing::{debug, warn};

use super::direction::direction_at;
use super::geodesy::{DistanceModel, StepLengths, EARTH_RADIUS};
use super::network::ReachNetwork;
use super::series::{ReachLayout, ReachProfile};

/// Parameters for reach attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeParams {
    /// How cell sizes map to ground distances. Default: `Auto`
    pub distance_model: DistanceModel,
    /// Sphere radius for geodesic distances, metres. Default: 6 371 000
    pub earth_radius: f64,
}

impl Default for AttributeParams {
    fn default() -> Self {
        Self {
            distance_model: DistanceModel::Auto,
            earth_radius: EARTH_RADIUS,
        }
    }
}

/// Distance and elevation along every reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachAttributes {
    /// Running-max elevation per reach pixel
    pub elevation: ReachProfile,
    /// Cumulative distance from the outlet per reach pixel, metres
    pub distance: ReachProfile,
}

/// Length of the step each cell takes along its own flow direction.
///
/// Cells without a direction get 0.
pub fn step_length_raster(flow_dir: &Raster<u8>, params: &AttributeParams) -> Result<Raster<f64>> {
    let (rows, cols) = flow_dir.shape();
    let steps = step_lengths(flow_dir, params)?;

    let mut data = Array2::<f64>::zeros((rows, cols));
    for ((r, c), v) in data.indexed_iter_mut() {
        if let Some(dir) = direction_at(flow_dir, r, c) {
            *v = steps.length(r, dir.step_class());
        }
    }
    Ok(flow_dir.with_data(data))
}

fn step_lengths(flow_dir: &Raster<u8>, params: &AttributeParams) -> Result<StepLengths> {
    if !(params.earth_radius > 0.0) {
        return Err(Error::InvalidParameter {
            name: "earth_radius",
            value: params.earth_radius.to_string(),
            reason: "must be positive".into(),
        });
    }
    let (rows, cols) = flow_dir.shape();
    let model = params
        .distance_model
        .resolve(flow_dir.transform(), flow_dir.crs(), rows, cols);
    Ok(StepLengths::compute(flow_dir.transform(), rows, model, params.earth_radius))
}

/// Compute distance and elevation profiles for every reach.
///
/// # Arguments
/// * `network` - Reach tree (from [`build_reach_network`](super::build_reach_network))
/// * `flow_dir` - D8 flow direction raster the network was built from
/// * `dem` - Elevation raster; no-data cells never raise the running maximum
/// * `params` - Distance model
///
/// Profiles of reaches without any valid elevation are NaN.
///
/// # Errors
/// Shape mismatches, or a reach pixel without a flow direction.
pub fn reach_attributes(
    network: &ReachNetwork,
    flow_dir: &Raster<u8>,
    dem: &Raster<f64>,
    params: &AttributeParams,
) -> Result<ReachAttributes> {
    flow_dir.ensure_shape(network.shape())?;
    dem.ensure_shape(network.shape())?;

    let cols = network.shape().1;
    let steps = step_lengths(flow_dir, params)?;
    let layout = ReachLayout::from_network(network);
    let mut elevation = ReachProfile::zeros(layout.clone());
    let mut distance = ReachProfile::zeros(layout);

    // Reach ids are breadth-first, so a downstream reach is always done first
    for reach in network.reaches() {
        let (mut dist, mut elev) = match reach.downstream {
            Some(down) => (
                last(distance.reach(down)?)?,
                last(elevation.reach(down)?)?,
            ),
            // An outlet without elevation takes the first valid value upstream
            None => {
                let seed = reach.pixels.iter().find_map(|p| {
                    let (r, c) = p.row_col(cols);
                    dem.valid(r, c).filter(|z| z.is_finite())
                });
                if seed.is_none() {
                    warn!(outlet = %reach.pixels[0], "no elevation along outlet reach");
                }
                (0.0, seed.unwrap_or(f64::NAN))
            }
        };

        let mut dists = Vec::with_capacity(reach.len());
        let mut elevs = Vec::with_capacity(reach.len());
        dists.push(dist);
        elevs.push(elev);

        for pixel in &reach.pixels[1..] {
            let (r, c) = pixel.row_col(cols);
            let dir = direction_at(flow_dir, r, c).ok_or_else(|| {
                Error::malformed(format!("river cell {} has no flow direction", pixel))
            })?;
            dist += steps.length(r, dir.step_class());
            // f64::max skips NaN, so a missing seed is replaced by the first value
            if let Some(z) = dem.valid(r, c) {
                elev = elev.max(z);
            }
            dists.push(dist);
            elevs.push(elev);
        }

        distance.reach_mut(reach.id)?.copy_from_slice(&dists);
        elevation.reach_mut(reach.id)?.copy_from_slice(&elevs);
    }

    debug!(reaches = network.len(), "computed reach profiles");
    Ok(ReachAttributes {
        elevation,
        distance,
    })
}

fn last(values: &[f64]) -> Result<f64> {
    values
        .last()
        .copied()
        .ok_or_else(|| Error::Algorithm("empty reach".into()))
}
