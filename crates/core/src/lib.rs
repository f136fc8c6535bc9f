//! # Tidemark Core
//!
//! Core types and GDAL I/O for the tidemark HMT inundation pipeline.
//!
//! This crate provides:
//! - `GeoTransform`: affine georeferencing with truncating world/pixel conversion
//! - `BlockTiling`: fixed-size block windows that partition a raster exactly
//! - `GridSpec`: size + geotransform + projection, and the co-registration check
//! - `CRS`: coordinate reference system handling (EPSG:2992 by default)
//! - Scoped GDAL raster/vector handles for block-wise reading and writing

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{BlockSize, BlockTiling, BlockWindow, GeoTransform, GridSpec, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{OutputFormat, OutputRaster, Progress, SourceRaster};
    pub use crate::raster::{
        BlockSize, BlockTiling, BlockWindow, GeoTransform, GridSpec, RasterElement,
    };
}
