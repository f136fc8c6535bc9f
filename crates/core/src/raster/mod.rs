//! Raster grid geometry: geotransforms, block tiling and grid specs

mod block;
mod element;
mod geotransform;
mod grid;

pub use block::{BlockSize, BlockTiling, BlockWindow};
pub use element::{is_nodata, RasterElement};
pub use geotransform::GeoTransform;
pub use grid::{ensure_coregistered, GridSpec};
