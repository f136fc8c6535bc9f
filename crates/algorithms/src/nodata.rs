//! Nodata normalization and presence masks

use crate::algebra::{BlockProcessor, RasterOptions};
use crate::maybe_rayon::*;
use gdal::raster::GdalDataType;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tidemark_core::io::{Progress, SourceRaster};
use tidemark_core::raster::is_nodata;
use tidemark_core::Result;
use tracing::{info, warn};

/// Sentinel assumed when a source raster declares no nodata value
pub const FALLBACK_NODATA: f64 = -88.8;

/// Nodata sentinel of mask rasters: 0 means "no data here"
pub const MASK_NODATA: f64 = 0.0;

/// Values at or below `original_nodata` become NaN
pub fn replace_nodata_block(block: &Array2<f64>, original_nodata: f64) -> Array2<f64> {
    block.mapv(|v| if v <= original_nodata { f64::NAN } else { v })
}

/// 1 where a value is present, 0 where it is nodata or NaN
pub fn presence_mask_block(block: &Array2<f64>, nodata: Option<f64>) -> Result<Array2<u8>> {
    let (rows, cols) = block.dim();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| u8::from(!is_nodata(block[[row, col]], nodata)))
                .collect::<Vec<u8>>()
        })
        .collect();

    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Copy `input` into `output`, turning every value at or below the source
/// nodata into NaN and declaring `desired_nodata` as the new sentinel.
///
/// A source without nodata metadata is treated as using -88.8.
pub fn fix_nodata(
    input: &Path,
    output: &Path,
    desired_nodata: f64,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    info!("Fixing nodata: {} -> {}", input.display(), output.display());
    let src = SourceRaster::open(input)?;
    let original = match src.nodata() {
        Some(nd) => nd,
        None => {
            warn!(
                "{} defines no nodata value; using {}",
                input.display(),
                FALLBACK_NODATA
            );
            FALLBACK_NODATA
        }
    };
    info!("  original nodata value: {}", original);
    info!("  desired nodata value: {}", desired_nodata);

    let processor = BlockProcessor::new(*options);
    let inputs = [("input", &src)];
    match src.band_type()? {
        GdalDataType::Float64 => processor.run::<f64, _>(&inputs, output, Some(desired_nodata), progress, |b| {
            Ok(replace_nodata_block(&b[0], original))
        }),
        _ => processor.run::<f32, _>(&inputs, output, Some(desired_nodata), progress, |b| {
            Ok(replace_nodata_block(&b[0], original).mapv(|v| v as f32))
        }),
    }
}

/// Write a Byte raster that is 0 where `input` is nodata (or NaN) and 1 elsewhere.
///
/// The mask declares 0 as its own nodata, so masking a mask reproduces it.
pub fn create_nodata_mask(
    input: &Path,
    output: &Path,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    info!("Creating nodata mask: {} -> {}", input.display(), output.display());
    let src = SourceRaster::open(input)?;
    let nodata = src.nodata();
    info!("  original nodata value: {:?}", nodata);

    BlockProcessor::new(*options).run::<u8, _>(
        &[("input", &src)],
        output,
        Some(MASK_NODATA),
        progress,
        |b| presence_mask_block(&b[0], nodata),
    )
}
