//! Raster-to-vector conversion of binary rasters

use gdal::vector::{LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use std::path::Path;
use tidemark_core::io::ffi::check_rc;
use tidemark_core::io::{create_shapefile, Progress, SourceRaster};
use tidemark_core::Result;
use tracing::info;

/// Name of the integer attribute holding the source cell value
pub const VALUE_FIELD: &str = "value";

/// Trace the connected regions of band 1 into polygons.
///
/// The band's own mask band limits polygonization to valid cells, so with
/// a nodata sentinel of 0 only the 1-regions become features. Any existing
/// output is replaced. Returns the number of features written.
pub fn binary_raster_to_vector(raster: &Path, output: &Path, progress: &Progress) -> Result<u64> {
    info!("Polygonizing {} -> {}", raster.display(), output.display());
    let src = SourceRaster::open(raster)?;
    let srs = src.spec().crs().map(|crs| crs.to_spatial_ref()).transpose()?;

    let mut vector = create_shapefile(output)?;
    let layer = vector.create_layer(LayerOptions {
        name: "poly",
        srs: srs.as_ref(),
        ty: OGRwkbGeometryType::wkbPolygon,
        options: None,
    })?;
    layer.create_defn_fields(&[(VALUE_FIELD, OGRFieldType::OFTInteger)])?;

    let band = src.band()?;
    let (callback, arg) = progress.gdal_callback();
    // SAFETY: band, mask band and layer handles all outlive the call
    let rc = unsafe {
        let band_h = band.c_rasterband();
        gdal_sys::GDALPolygonize(
            band_h,
            gdal_sys::GDALGetMaskBand(band_h),
            layer.c_layer(),
            0,
            std::ptr::null_mut(),
            callback,
            arg,
        )
    };
    check_rc(rc, "Polygonize")?;

    let count = layer.feature_count();
    info!("  {} features written", count);
    Ok(count)
}
