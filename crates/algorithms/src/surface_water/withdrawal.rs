//! Withdrawal allocation
//!
//! Withdrawal volumes requested on basin cells are gathered onto the
//! nearest river cell (see [`assign_catchments`]) and taken from the river
//! there. A withdrawal lowers discharge at the withdrawal point and at
//! every river cell downstream of it: positions `0..=index` of its own reach
//! and every cell of every reach further down. Withdrawals never take more
//! than the discharge available at the point; the shortfall is the water
//! error.
//!
//! Points are processed from the headwaters down so that the discharge
//! available at a point already reflects every withdrawal upstream of it.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};
use surfwat_core::raster::{Raster, RasterCube};
use surfwat_core::{Error, Result};
use tracing::{debug, info, warn};

use super::catchment::assign_catchments;
use super::network::{ReachId, ReachNetwork};
use super::pixel::PixelId;
use super::series::{ReachLayout, ReachSeries};

/// Parameters for withdrawal allocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalParams {
    /// Largest distance, in cells, between a withdrawal cell and the river
    /// cell serving it. `None` assigns every basin cell.
    pub max_search_radius: Option<f64>,
}

/// A river cell where withdrawals are taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPoint {
    pub pixel: PixelId,
    pub reach: ReachId,
    /// Position in the reach's pixel list
    pub index: usize,
    /// Catchment demand per time step
    pub requested: Array1<f64>,
    /// Volume actually withdrawn per time step
    pub actual: Array1<f64>,
}

/// Volumes requested, withdrawn and missing, per time step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub requested: Array1<f64>,
    pub actual: Array1<f64>,
    /// Requested volume the river could not supply
    pub water_error: Array1<f64>,
    /// Basin cells with a withdrawal but no river cell within reach
    pub unassigned_pixels: usize,
    /// Volume requested on unassigned cells, per time step
    pub unassigned_volume: Array1<f64>,
    pub points: Vec<WithdrawalPoint>,
}

impl AllocationReport {
    fn empty(time_steps: usize) -> Self {
        Self {
            requested: Array1::zeros(time_steps),
            actual: Array1::zeros(time_steps),
            water_error: Array1::zeros(time_steps),
            unassigned_pixels: 0,
            unassigned_volume: Array1::zeros(time_steps),
            points: Vec::new(),
        }
    }

    pub fn total_requested(&self) -> f64 {
        self.requested.sum()
    }

    pub fn total_actual(&self) -> f64 {
        self.actual.sum()
    }

    pub fn total_water_error(&self) -> f64 {
        self.water_error.sum()
    }
}

/// Discharge after withdrawals, with the allocation report
#[derive(Debug, Clone)]
pub struct Allocation {
    pub discharge: ReachSeries,
    pub report: AllocationReport,
}

/// Subtract `amount`, clamping a non-negative value that would reach zero
/// or below to exactly zero
fn deplete(old: f64, amount: f64) -> f64 {
    let new = old - amount;
    if old >= 0.0 && new <= 0.0 {
        0.0
    } else {
        new
    }
}

/// Allocate withdrawals against reach discharge.
///
/// # Arguments
/// * `discharge` - Discharge per reach pixel and time step; not modified
/// * `network` - Reach tree the discharge is laid out on
/// * `withdrawal` - Requested volume `[time, row, col]`; no-data, NaN and
///   negative values request nothing
/// * `basin` - Basin mask; withdrawals outside it are ignored
/// * `params` - Catchment search settings
///
/// # Returns
/// A new discharge series and the [`AllocationReport`]
pub fn allocate_withdrawals(
    discharge: &ReachSeries,
    network: &ReachNetwork,
    withdrawal: &RasterCube<f64>,
    basin: &Raster<u8>,
    params: &WithdrawalParams,
) -> Result<Allocation> {
    let (rows, cols) = network.shape();
    let (ar, ac) = withdrawal.grid_shape();
    if (ar, ac) != (rows, cols) {
        return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
    }
    if *discharge.layout() != ReachLayout::from_network(network) {
        return Err(Error::Algorithm(
            "discharge series does not match the reach network".into(),
        ));
    }
    let time_steps = discharge.time_steps();
    if withdrawal.time_steps() != time_steps {
        return Err(Error::TimeMismatch {
            expected: time_steps,
            actual: withdrawal.time_steps(),
        });
    }

    let catchments = assign_catchments(network, basin, params.max_search_radius)?;
    let mut report = AllocationReport::empty(time_steps);

    // Demand gathered on each serving river cell
    let mut demand: BTreeMap<PixelId, Array1<f64>> = BTreeMap::new();
    for r in 0..rows {
        for c in 0..cols {
            if !basin.is_set(r, c) {
                continue;
            }
            let requested = Array1::from_shape_fn(time_steps, |t| {
                withdrawal.valid(t, r, c).map_or(0.0, |v| v.max(0.0))
            });
            if requested.iter().all(|&v| v == 0.0) {
                continue;
            }
            match catchments.valid(r, c) {
                Some(id) => {
                    *demand
                        .entry(PixelId(id))
                        .or_insert_with(|| Array1::zeros(time_steps)) += &requested;
                }
                None => {
                    report.unassigned_pixels += 1;
                    report.unassigned_volume += &requested;
                }
            }
        }
    }

    let mut points = Vec::with_capacity(demand.len());
    for (pixel, requested) in demand {
        let (reach, index) = network.owner(pixel).ok_or_else(|| {
            Error::Algorithm(format!("river cell {} has no owning reach", pixel))
        })?;
        points.push(WithdrawalPoint {
            pixel,
            reach,
            index,
            actual: Array1::zeros(time_steps),
            requested,
        });
    }
    // Upstream reaches have larger ids; upstream cells have larger indices
    points.sort_by_key(|p| (Reverse(p.reach), Reverse(p.index)));

    let mut after = discharge.clone();
    for point in &mut points {
        let available = after.at(point.reach, point.index)?.to_owned();
        let downstream: Vec<ReachId> = network.downstream_of(point.reach).map(|r| r.id).collect();

        for t in 0..time_steps {
            let taken = point.requested[t].min(available[t].max(0.0));
            point.actual[t] = taken;
            if taken <= 0.0 {
                continue;
            }
            let mut own = after.reach_mut(point.reach)?;
            own.row_mut(t)
                .slice_mut(s![..=point.index])
                .mapv_inplace(|v| deplete(v, taken));
            for &id in &downstream {
                after
                    .reach_mut(id)?
                    .row_mut(t)
                    .mapv_inplace(|v| deplete(v, taken));
            }
        }

        report.requested += &point.requested;
        report.actual += &point.actual;
    }
    report.water_error = (&report.requested - &report.actual).mapv(|v| v.max(0.0));

    sync_confluences(&mut after, network)?;

    if report.unassigned_pixels > 0 {
        warn!(
            pixels = report.unassigned_pixels,
            volume = report.unassigned_volume.sum(),
            "withdrawal cells without a serving river cell"
        );
    }
    let water_error = report.total_water_error();
    if water_error > 0.0 {
        warn!(water_error, "withdrawals exceeded available discharge");
    }
    debug!(points = points.len(), time_steps, "allocated withdrawals");
    info!(
        requested = report.total_requested(),
        actual = report.total_actual(),
        water_error,
        "withdrawal allocation done"
    );

    report.points = points;
    Ok(Allocation {
        discharge: after,
        report,
    })
}

/// Copy each confluence value from its owning (downstream) reach into the
/// first position of the reaches that join there
fn sync_confluences(series: &mut ReachSeries, network: &ReachNetwork) -> Result<()> {
    for reach in network.reaches() {
        let Some(down) = reach.downstream else {
            continue;
        };
        let last = network
            .reach(down)
            .map(|r| r.len().saturating_sub(1))
            .unwrap_or(0);
        let owned = series.at(down, last)?.to_owned();
        series.reach_mut(reach.id)?.column_mut(0).assign(&owned);
    }
    Ok(())
}
