//! Time stacks of co-registered rasters

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// A `[time, row, col]` stack of grids sharing one transform.
///
/// Runoff and withdrawal volumes arrive as monthly cubes, and routed
/// discharge is returned in the same layout.
#[derive(Debug, Clone)]
pub struct RasterCube<T: RasterElement> {
    data: Array3<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> RasterCube<T> {
    /// Create a cube of zeros
    pub fn new(time_steps: usize, rows: usize, cols: usize) -> Self {
        Self::from_array(Array3::zeros((time_steps, rows, cols)))
    }

    /// Create a cube from an ndarray laid out as `[time, row, col]`
    pub fn from_array(data: Array3<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a cube from time-major data
    pub fn from_vec(data: Vec<T>, time_steps: usize, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != time_steps * rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array3::from_shape_vec((time_steps, rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Stack single-time rasters. All layers must share the first layer's shape;
    /// metadata is taken from the first layer.
    pub fn stack(layers: &[Raster<T>]) -> Result<Self> {
        let first = layers.first().ok_or(Error::InvalidDimensions {
            width: 0,
            height: 0,
        })?;
        for layer in layers {
            first.ensure_shape(layer.shape())?;
        }
        let views: Vec<ArrayView2<'_, T>> = layers.iter().map(|l| l.view()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            data,
            transform: *first.transform(),
            crs: first.crs().cloned(),
            nodata: first.nodata(),
        })
    }

    /// Number of time steps
    pub fn time_steps(&self) -> usize {
        self.data.dim().0
    }

    /// Grid shape as (rows, cols)
    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    /// Full shape as (time, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// View of one time step
    pub fn layer(&self, t: usize) -> Result<ArrayView2<'_, T>> {
        if t >= self.time_steps() {
            return Err(Error::TimeMismatch {
                expected: t + 1,
                actual: self.time_steps(),
            });
        }
        Ok(self.data.index_axis(Axis(0), t))
    }

    /// Value at (t, row, col), or `None` when out of bounds or no-data
    pub fn valid(&self, t: usize, row: usize, col: usize) -> Option<T> {
        self.data
            .get((t, row, col))
            .copied()
            .filter(|v| !v.is_nodata(self.nodata))
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }
}

impl RasterCube<f64> {
    /// Per-pixel mean over the time axis; no-data samples are skipped and
    /// pixels without any valid sample become NaN.
    pub fn time_mean(&self) -> Array2<f64> {
        let (_, rows, cols) = self.data.dim();
        let mut sum = Array2::<f64>::zeros((rows, cols));
        let mut count = Array2::<u32>::zeros((rows, cols));

        for layer in self.data.outer_iter() {
            for ((idx, &v), n) in layer.indexed_iter().zip(count.iter_mut()) {
                if !v.is_nodata(self.nodata) {
                    sum[idx] += v;
                    *n += 1;
                }
            }
        }

        ndarray::Zip::from(&mut sum).and(&count).for_each(|s, &n| {
            *s = if n > 0 { *s / n as f64 } else { f64::NAN };
        });
        sum
    }
}
