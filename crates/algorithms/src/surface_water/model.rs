//! End-to-end surface-water model
//!
//! Chains the stages over one grid: routing, river extraction, reach tree,
//! reach attributes, reach discharge and (optionally) withdrawal allocation.

use serde::{Deserialize, Serialize};
use surfwat_core::raster::{Raster, RasterCube};
use surfwat_core::{Algorithm, Error, Result};
use tracing::{info, info_span};

use super::attributes::{reach_attributes, AttributeParams, ReachAttributes};
use super::network::{build_reach_network, ReachNetwork};
use super::rivers::{extract_rivers, RiverParams};
use super::routing::{route, RoutingResult};
use super::series::ReachSeries;
use super::withdrawal::{allocate_withdrawals, Allocation, WithdrawalParams};

/// Parameters of every stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceWaterParams {
    pub rivers: RiverParams,
    pub attributes: AttributeParams,
    pub withdrawals: WithdrawalParams,
}

/// Model inputs, all on the flow direction grid
#[derive(Debug, Clone)]
pub struct SurfaceWaterInputs {
    /// D8 flow directions
    pub flow_dir: Raster<u8>,
    /// Basin mask (1 inside)
    pub basin: Raster<u8>,
    /// Elevation, metres
    pub dem: Raster<f64>,
    /// Runoff volume per time step, m³
    pub runoff: RasterCube<f64>,
    /// Requested withdrawal volume per time step, m³
    pub withdrawal: Option<RasterCube<f64>>,
}

/// Everything the model derives
#[derive(Debug, Clone)]
pub struct SurfaceWaterOutputs {
    pub routing: RoutingResult,
    /// Binary river raster, restricted to cells of the reach tree
    pub rivers: Raster<u8>,
    pub network: ReachNetwork,
    pub attributes: ReachAttributes,
    /// Routed discharge along every reach, before withdrawals
    pub discharge: ReachSeries,
    /// Discharge after withdrawals, when withdrawals were given
    pub allocation: Option<Allocation>,
}

impl SurfaceWaterOutputs {
    /// Discharge after withdrawals, or the routed discharge without any
    pub fn final_discharge(&self) -> &ReachSeries {
        self.allocation
            .as_ref()
            .map_or(&self.discharge, |a| &a.discharge)
    }
}

/// Run the full model.
pub fn run_surface_water(
    inputs: &SurfaceWaterInputs,
    params: &SurfaceWaterParams,
) -> Result<SurfaceWaterOutputs> {
    let shape = inputs.flow_dir.shape();
    inputs.basin.ensure_shape(shape)?;
    inputs.dem.ensure_shape(shape)?;
    if let Some(withdrawal) = &inputs.withdrawal {
        inputs.flow_dir.ensure_shape(withdrawal.grid_shape())?;
        if withdrawal.time_steps() != inputs.runoff.time_steps() {
            return Err(Error::TimeMismatch {
                expected: inputs.runoff.time_steps(),
                actual: withdrawal.time_steps(),
            });
        }
    }

    let span = info_span!("surface_water", rows = shape.0, cols = shape.1);
    let _guard = span.enter();

    let routing = route(&inputs.runoff, &inputs.flow_dir, &inputs.basin)?;
    let rivers = extract_rivers(&routing.routed_discharge, &inputs.basin, params.rivers.clone())?;
    let network = build_reach_network(&inputs.flow_dir, &rivers, &routing.accumulated_pixels)?;
    let rivers = network.clear_dropped(&rivers)?;
    let attributes = reach_attributes(&network, &inputs.flow_dir, &inputs.dem, &params.attributes)?;
    let discharge = ReachSeries::from_cube(&network, &routing.routed_discharge)?;

    let allocation = match &inputs.withdrawal {
        Some(withdrawal) => Some(allocate_withdrawals(
            &discharge,
            &network,
            withdrawal,
            &inputs.basin,
            &params.withdrawals,
        )?),
        None => None,
    };

    info!(
        reaches = network.len(),
        river_cells = network.river_pixels().len(),
        time_steps = discharge.time_steps(),
        "surface water model done"
    );

    Ok(SurfaceWaterOutputs {
        routing,
        rivers,
        network,
        attributes,
        discharge,
        allocation,
    })
}

/// Surface-water model as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct SurfaceWaterModel;

impl Algorithm for SurfaceWaterModel {
    type Input = SurfaceWaterInputs;
    type Output = SurfaceWaterOutputs;
    type Params = SurfaceWaterParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Surface Water Model"
    }

    fn description(&self) -> &'static str {
        "Route runoff, build the river reach tree and allocate withdrawals"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        run_surface_water(&input, &params)
    }
}
