//! # SurfWAT Algorithms
//!
//! Surface-water accounting over D8 flow direction rasters.
//!
//! ## Stages
//!
//! - **routing**: accumulate runoff volumes and pixel counts downstream
//! - **rivers**: classify river cells from routed discharge
//! - **network**: split river cells into a tree of reaches
//! - **attributes**: distance and elevation along each reach
//! - **withdrawal**: take withdrawals from the nearest river and propagate
//!   the depletion downstream

pub mod surface_water;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::surface_water::{
        allocate_withdrawals, build_reach_network, extract_rivers, reach_attributes, route,
        run_surface_water, AttributeParams, DistanceModel, FlowRouting, PixelId, Reach,
        ReachNetwork, ReachSeries, RiverParams, SurfaceWaterInputs, SurfaceWaterModel,
        SurfaceWaterParams, WithdrawalParams,
    };
    pub use surfwat_core::prelude::*;
}
