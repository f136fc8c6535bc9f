//! GDAL-backed raster and vector I/O

mod dataset;
pub mod ffi;
mod progress;
mod vector;

pub use dataset::{
    compute_statistics, delete_raster, file_size_mb, BandStatistics, OutputFormat, OutputRaster,
    SourceRaster, OVERVIEW_LEVELS,
};
pub use progress::Progress;
pub use vector::{create_shapefile, delete_vector, open_vector, SHAPEFILE_DRIVER};
