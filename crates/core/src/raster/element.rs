//! Cell value trait for rasters and raster cubes

use num_traits::Zero;
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Flow directions and masks are stored as small unsigned integers,
/// elevations and water volumes as floats.
pub trait RasterElement:
    Copy + Debug + PartialOrd + PartialEq + Zero + Send + Sync + 'static
{
    /// Conventional no-data marker for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;
}

macro_rules! impl_raster_element_int {
    ($t:ty, $nodata:expr) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                $nodata
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            /// Water accounting rasters use -9999 as fill value
            fn default_nodata() -> Self {
                -9999.0
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    Some(nd) => (self - nd).abs() <= <$t>::EPSILON * nd.abs().max(1.0),
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_int!(u8, u8::MAX);
impl_raster_element_int!(u16, u16::MAX);
impl_raster_element_int!(u32, u32::MAX);
impl_raster_element_int!(u64, u64::MAX);
impl_raster_element_int!(i16, -9999);
impl_raster_element_int!(i32, -9999);
impl_raster_element_int!(i64, -9999);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);
