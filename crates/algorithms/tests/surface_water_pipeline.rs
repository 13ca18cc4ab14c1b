//! End-to-end checks of the surface-water model on synthetic basins

use std::collections::HashSet;

use approx::assert_relative_eq;
use surfwat_algorithms::surface_water::{
    route, run_surface_water, AttributeParams, DistanceModel, PixelId, RiverParams,
    SurfaceWaterInputs, SurfaceWaterParams, WithdrawalParams,
};
use surfwat_core::{Error, GeoTransform, Raster, RasterCube};
use tracing_subscriber::EnvFilter;

const SIZE: usize = 8;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Columns flow south into the bottom row, which flows east to an outlet
/// in the bottom-right corner draining off the grid
fn comb_inputs(withdrawal: Option<RasterCube<f64>>) -> SurfaceWaterInputs {
    let transform = GeoTransform::new(300_000.0, 6_000_000.0, 30.0, -30.0);

    let mut flow_dir = Raster::filled(SIZE, SIZE, 4u8);
    for col in 0..SIZE - 1 {
        flow_dir.set(SIZE - 1, col, 1).unwrap();
    }
    flow_dir.set_transform(transform);

    let mut dem = Raster::new(SIZE, SIZE);
    for row in 0..SIZE {
        for col in 0..SIZE {
            let z = 100.0 + (SIZE - row) as f64 * 5.0 + (SIZE - col) as f64 * 2.0;
            dem.set(row, col, z).unwrap();
        }
    }
    dem.set_transform(transform);

    // Two time steps: 1 m³ and 2 m³ per cell
    let runoff = RasterCube::from_vec(
        (0..2 * SIZE * SIZE)
            .map(|i| if i < SIZE * SIZE { 1.0 } else { 2.0 })
            .collect(),
        2,
        SIZE,
        SIZE,
    )
    .unwrap();

    SurfaceWaterInputs {
        flow_dir,
        basin: Raster::filled(SIZE, SIZE, 1u8),
        dem,
        runoff,
        withdrawal,
    }
}

fn comb_params() -> SurfaceWaterParams {
    SurfaceWaterParams {
        rivers: RiverParams { quantile: 0.8 },
        attributes: AttributeParams {
            distance_model: DistanceModel::Planar,
            ..Default::default()
        },
        withdrawals: WithdrawalParams::default(),
    }
}

#[test]
fn test_south_chain_scenario() {
    init_tracing();
    let fdir = Raster::filled(3, 3, 4u8);
    let basin = Raster::filled(3, 3, 1u8);
    let runoff = RasterCube::from_vec(vec![1.0; 9], 1, 3, 3).unwrap();

    let result = route(&runoff, &fdir, &basin).unwrap();
    for col in 0..3 {
        assert_eq!(result.accumulated_pixels.get(2, col).unwrap(), 3.0);
        assert_eq!(result.routed_discharge.valid(0, 2, col), Some(3.0));
    }
}

#[test]
fn test_routing_conserves_mass_at_outlet() {
    init_tracing();
    let inputs = comb_inputs(None);
    let out = run_surface_water(&inputs, &comb_params()).unwrap();

    assert_eq!(out.routing.outlets, vec![(SIZE - 1, SIZE - 1)]);
    assert_eq!(
        out.routing.accumulated_pixels.get(SIZE - 1, SIZE - 1).unwrap(),
        (SIZE * SIZE) as f64
    );
    for t in 0..2 {
        let entering = inputs.runoff.layer(t).unwrap().sum();
        let at_outlet = out.routing.routed_discharge.valid(t, SIZE - 1, SIZE - 1).unwrap();
        assert_relative_eq!(at_outlet, entering);
    }
}

#[test]
fn test_reaches_partition_river_cells() {
    init_tracing();
    let out = run_surface_water(&comb_inputs(None), &comb_params()).unwrap();

    let rivers: Vec<PixelId> = (0..SIZE)
        .flat_map(|r| (0..SIZE).map(move |c| (r, c)))
        .filter(|&(r, c)| out.rivers.get(r, c).unwrap() == 1)
        .map(|(r, c)| PixelId::new(r, c, SIZE))
        .collect();
    assert!(!rivers.is_empty());

    let mut owned = Vec::new();
    for reach in out.network.reaches() {
        owned.extend(reach.pixels.iter().skip(reach.first_owned()).copied());
    }
    owned.sort_unstable();
    let unique: HashSet<PixelId> = owned.iter().copied().collect();
    assert_eq!(unique.len(), owned.len(), "a river cell is owned twice");
    assert_eq!(owned, rivers);

    // Every non-outlet reach starts on the last cell of its downstream reach
    for reach in out.network.reaches() {
        if let Some(down) = reach.downstream {
            let parent = out.network.reach(down).unwrap();
            assert_eq!(reach.pixels.first(), parent.pixels.last());
            assert!(parent.upstream.contains(&reach.id));
        }
    }
}

#[test]
fn test_profiles_are_monotonic() {
    init_tracing();
    let out = run_surface_water(&comb_inputs(None), &comb_params()).unwrap();

    for reach in out.network.reaches() {
        let elevation = out.attributes.elevation.reach(reach.id).unwrap();
        let distance = out.attributes.distance.reach(reach.id).unwrap();
        for k in 1..reach.len() {
            assert!(elevation[k] >= elevation[k - 1], "reach {} elevation", reach.id);
            assert!(distance[k] > distance[k - 1], "reach {} distance", reach.id);
        }
    }
    let outlet = out.network.outlets().next().unwrap();
    assert_eq!(out.attributes.distance.reach(outlet.id).unwrap()[0], 0.0);
}

#[test]
fn test_withdrawals_keep_discharge_non_negative() {
    init_tracing();
    let mut withdrawal = RasterCube::new(2, SIZE, SIZE);
    for r in 0..SIZE {
        for c in 0..SIZE {
            withdrawal.data_mut()[(0, r, c)] = 0.5;
        }
    }
    // Far more than the river can carry
    withdrawal.data_mut()[(1, 0, 3)] = 500.0;

    let out = run_surface_water(&comb_inputs(Some(withdrawal)), &comb_params()).unwrap();
    let allocation = out.allocation.as_ref().unwrap();
    let report = &allocation.report;

    assert!(allocation.discharge.min().unwrap() >= 0.0);
    assert_eq!(report.unassigned_pixels, 0);
    assert_relative_eq!(report.requested[0], 0.5 * (SIZE * SIZE) as f64, epsilon = 1e-9);
    assert_relative_eq!(report.requested[1], 500.0);
    assert!(report.water_error[1] > 0.0);
    assert_relative_eq!(
        report.total_actual() + report.total_water_error(),
        report.total_requested(),
        epsilon = 1e-9
    );

    // Routed discharge is kept next to the depleted copy
    let before = out.discharge.totals();
    let after = allocation.discharge.totals();
    assert!(after[0] < before[0]);
    assert!(after[1] < before[1]);
}

#[test]
fn test_dry_basin_has_no_rivers() {
    init_tracing();
    let mut inputs = comb_inputs(None);
    inputs.runoff = RasterCube::new(2, SIZE, SIZE);

    let result = run_surface_water(&inputs, &comb_params());
    assert!(matches!(result, Err(Error::NoRiverNetworkFound(_))));
}

#[test]
fn test_cycle_is_rejected() {
    init_tracing();
    let mut inputs = comb_inputs(None);
    // (0,0) -> E and (0,1) -> W point at each other
    inputs.flow_dir.set(0, 0, 1).unwrap();
    inputs.flow_dir.set(0, 1, 16).unwrap();

    let result = run_surface_water(&inputs, &comb_params());
    assert!(matches!(result, Err(Error::MalformedFlowNetwork { .. })));
}
