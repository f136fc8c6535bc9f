//! # Tidemark Algorithms
//!
//! The processing stages of the HMT inundation pipeline.
//!
//! ## Stages
//!
//! - **nodata**: nodata sentinel normalization and presence masks
//! - **fill**: inverse-distance fill of masked nodata regions
//! - **reproject**: window extraction, reprojection and snap-to-template
//! - **algebra**: block-wise datum conversion and below-HMT classification
//! - **polygonize**: binary raster to polygon shapefile
//! - **aggregate**: per-region dissolve and area report
//! - **pipeline**: the per-tile chain wiring the stages together

pub mod aggregate;
pub mod algebra;
pub mod fill;
pub(crate) mod maybe_rayon;
pub mod nodata;
pub mod pipeline;
pub mod polygonize;
pub mod reproject;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{aggregate_region, dissolve, AggregateParams, AreaReport, RegionArea, TileVector};
    pub use crate::algebra::{
        classify_below_hmt, convert_to_tidal_datum, BlockProcessor, HmtThreshold, RasterOptions,
    };
    pub use crate::fill::{fill_nodata, FillParams};
    pub use crate::nodata::{create_nodata_mask, fix_nodata};
    pub use crate::pipeline::{process_tile, Datum, DatumRun, TileJob, TileOutcome};
    pub use crate::polygonize::binary_raster_to_vector;
    pub use crate::reproject::{
        reproject_to_template, reproject_window, reproject_window_offset, ReprojectParams,
        ResampleMethod, WindowBounds,
    };
    pub use tidemark_core::prelude::*;
}
