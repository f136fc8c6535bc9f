//! Raster element trait for generic cell values

use gdal::raster::GdalType;
use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in an output raster cell.
///
/// Block kernels compute in `f64`; output blocks are cast back to the
/// band type through this trait.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + GdalType + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Convert from f64; values the type cannot hold become the default nodata
    fn from_f64_lossy(value: f64) -> Self {
        NumCast::from(value).unwrap_or_else(Self::default_nodata)
    }

    /// Convert self to f64
    fn as_f64(self) -> f64 {
        NumCast::from(self).unwrap_or(f64::NAN)
    }
}

impl RasterElement for u8 {
    fn default_nodata() -> Self {
        0
    }
}

macro_rules! impl_raster_element_float {
    ($t:ty, $nd:expr) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                $nd
            }
        }
    };
}

impl_raster_element_float!(f32, -9999.0);
impl_raster_element_float!(f64, -9999.0);

/// Whether a cell read as f64 is nodata: NaN, or equal to the band sentinel.
#[inline]
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) if nd.is_nan() => false,
        Some(nd) => value == nd,
        None => false,
    }
}
