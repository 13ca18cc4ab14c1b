//! Cell lengths and areas on geographic and projected grids
//!
//! On a lon/lat grid the east-west size of a cell shrinks with latitude,
//! so every row gets its own step lengths. Distances use the haversine
//! great-circle formula on a sphere; areas use the spherical zone formula
//! `R²·Δλ·|sin φ₁ − sin φ₂|`.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use surfwat_core::raster::{GeoTransform, Raster, RasterCube};
use surfwat_core::{Error, Result, CRS};

use super::direction::StepClass;

/// Mean Earth radius in metres
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// How cell sizes translate into ground distances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Geodesic for geographic CRSs (or degree-sized cells without a CRS), planar otherwise
    #[default]
    Auto,
    /// Cell sizes are degrees
    Geodesic,
    /// Cell sizes are metres
    Planar,
}

impl DistanceModel {
    /// Resolve [`DistanceModel::Auto`] for a concrete grid
    pub fn resolve(
        self,
        transform: &GeoTransform,
        crs: Option<&CRS>,
        rows: usize,
        cols: usize,
    ) -> Self {
        match self {
            DistanceModel::Auto => {
                let geographic = match crs {
                    Some(crs) => crs.is_geographic(),
                    None => transform.looks_geographic(rows, cols),
                };
                if geographic {
                    DistanceModel::Geodesic
                } else {
                    DistanceModel::Planar
                }
            }
            other => other,
        }
    }
}

/// Great-circle distance between two lon/lat points given in degrees
pub fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64, radius: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * radius * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Ground length of one D8 step per grid row
#[derive(Debug, Clone, PartialEq)]
pub struct StepLengths {
    horizontal: Vec<f64>,
    vertical: Vec<f64>,
    diagonal: Vec<f64>,
}

impl StepLengths {
    /// Compute step lengths for `rows` rows of a grid.
    ///
    /// `model` must already be resolved; `Auto` is treated as planar.
    pub fn compute(
        transform: &GeoTransform,
        rows: usize,
        model: DistanceModel,
        radius: f64,
    ) -> Self {
        let dx = transform.cell_width();
        let dy = transform.cell_height();

        let mut horizontal = Vec::with_capacity(rows);
        let mut vertical = Vec::with_capacity(rows);
        let mut diagonal = Vec::with_capacity(rows);

        for row in 0..rows {
            match model {
                DistanceModel::Geodesic => {
                    let lat = transform.row_center_y(row);
                    let (south, north) = (lat - dy / 2.0, lat + dy / 2.0);
                    horizontal.push(haversine(0.0, lat, dx, lat, radius));
                    vertical.push(haversine(0.0, south, 0.0, north, radius));
                    diagonal.push(haversine(0.0, south, dx, north, radius));
                }
                DistanceModel::Planar | DistanceModel::Auto => {
                    horizontal.push(dx);
                    vertical.push(dy);
                    diagonal.push(dx.hypot(dy));
                }
            }
        }

        Self {
            horizontal,
            vertical,
            diagonal,
        }
    }

    /// Length of a step of `class` leaving a cell in `row`
    pub fn length(&self, row: usize, class: StepClass) -> f64 {
        match class {
            StepClass::Horizontal => self.horizontal[row],
            StepClass::Vertical => self.vertical[row],
            StepClass::Diagonal => self.diagonal[row],
        }
    }
}

/// Area of every cell in m² (or squared map units for planar grids)
pub fn pixel_area(
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    model: DistanceModel,
    radius: f64,
) -> Raster<f64> {
    let dx = transform.cell_width();
    let dy = transform.cell_height();

    let mut area = Array2::<f64>::zeros((rows, cols));
    for (row, mut line) in area.outer_iter_mut().enumerate() {
        let a = match model {
            DistanceModel::Geodesic => {
                let lat = transform.row_center_y(row);
                let s = (lat - dy / 2.0).to_radians().sin();
                let n = (lat + dy / 2.0).to_radians().sin();
                radius * radius * dx.to_radians() * (n - s).abs()
            }
            DistanceModel::Planar | DistanceModel::Auto => dx * dy,
        };
        line.fill(a);
    }

    let mut raster = Raster::from_array(area);
    raster.set_transform(*transform);
    raster
}

/// Convert a runoff depth cube in millimetres into volumes in m³.
///
/// No-data depths stay no-data (NaN) in the output.
pub fn depth_to_volume(
    depth_mm: &RasterCube<f64>,
    area_m2: &Raster<f64>,
) -> Result<RasterCube<f64>> {
    area_m2.ensure_shape(depth_mm.grid_shape())?;
    if area_m2.data().iter().any(|&a| !a.is_finite() || a < 0.0) {
        return Err(Error::Algorithm("cell areas must be finite and non-negative".into()));
    }

    let mut volume = depth_mm.clone();
    let nodata = depth_mm.nodata();
    for mut layer in volume.data_mut().outer_iter_mut() {
        ndarray::Zip::from(&mut layer)
            .and(area_m2.data())
            .for_each(|v, &a| {
                *v = if v.is_nan() || nodata.map_or(false, |nd| *v == nd) {
                    f64::NAN
                } else {
                    *v / 1000.0 * a
                };
            });
    }
    volume.set_nodata(None);
    Ok(volume)
}
