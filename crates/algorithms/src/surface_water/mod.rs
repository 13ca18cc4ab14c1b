//! Surface-water routing and withdrawal allocation
//!
//! Stages, leaf first:
//! - [`direction`]: D8 codes and receivers
//! - [`routing`]: runoff and pixel-count accumulation in drainage order
//! - [`rivers`]: quantile threshold of time-mean discharge
//! - [`outlets`], [`graph`], [`network`]: the reach tree over river cells
//! - [`geodesy`], [`attributes`]: step lengths, distance and elevation profiles
//! - [`catchment`], [`withdrawal`]: nearest-river assignment and allocation
//! - [`model`]: all of the above in one call
//!
//! Cells are identified by [`PixelId`] (`row * cols + col + 1`).

pub mod attributes;
pub mod catchment;
pub mod direction;
pub mod geodesy;
pub mod graph;
pub mod model;
pub mod network;
pub mod outlets;
pub mod pixel;
pub mod rivers;
pub mod routing;
pub mod series;
pub mod withdrawal;

pub use attributes::{reach_attributes, step_length_raster, AttributeParams, ReachAttributes};
pub use catchment::{assign_catchments, RiverIndex};
pub use direction::{direction_at, receiver, validate_flow_direction, StepClass, D8};
pub use geodesy::{
    depth_to_volume, haversine, pixel_area, DistanceModel, StepLengths, EARTH_RADIUS,
};
pub use graph::RiverGraph;
pub use model::{
    run_surface_water, SurfaceWaterInputs, SurfaceWaterModel, SurfaceWaterOutputs,
    SurfaceWaterParams,
};
pub use network::{build_reach_network, Reach, ReachId, ReachNetwork};
pub use outlets::{select_outlets, OutletSelection};
pub use pixel::PixelId;
pub use rivers::{
    extract_rivers, extract_rivers_from, quantile, RiverParams, DEFAULT_RIVER_QUANTILE,
};
pub use routing::{route, FlowRouting, RoutingInput, RoutingResult};
pub use series::{ReachLayout, ReachProfile, ReachSeries};
pub use withdrawal::{
    allocate_withdrawals, Allocation, AllocationReport, WithdrawalParams, WithdrawalPoint,
};
