//! Inverse-distance fill of nodata regions
//!
//! Wraps `GDALFillNodata`: the source band is copied into a fresh Float32
//! raster and every cell the mask marks as 0 is interpolated from the valid
//! cells around it.

use crate::algebra::{BlockProcessor, RasterOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tidemark_core::io::ffi::check_rc;
use tidemark_core::io::{Progress, SourceRaster};
use tidemark_core::raster::is_nodata;
use tidemark_core::{Error, Result};
use tracing::info;

/// Parameters for [`fill_nodata`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillParams {
    /// Search radius in pixels; 0 searches the whole raster
    pub max_distance: f64,
    /// Number of 3x3 smoothing passes over the filled cells
    pub smoothing_iterations: u32,
    /// Nodata sentinel of the output
    pub nodata: f64,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            max_distance: 0.0,
            smoothing_iterations: 0,
            nodata: -9999.0,
        }
    }
}

/// Search radius actually handed to GDAL
pub fn effective_max_distance(max_distance: f64, cols: usize, rows: usize) -> f64 {
    if max_distance > 0.0 {
        max_distance
    } else {
        ((cols * cols + rows * rows) as f64).sqrt().ceil()
    }
}

/// Fill the cells of `input` that `mask` marks as 0, writing `output`.
///
/// `mask` must be co-registered with `input`. Cells the fill cannot reach
/// stay at the output nodata.
pub fn fill_nodata(
    input: &Path,
    mask: &Path,
    output: &Path,
    params: &FillParams,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    if params.max_distance < 0.0 {
        return Err(Error::InvalidParameter {
            name: "max_distance",
            value: params.max_distance.to_string(),
            reason: "must be zero or positive".into(),
        });
    }
    info!("Filling nodata: {} (mask {}) -> {}", input.display(), mask.display(), output.display());
    let src = SourceRaster::open(input)?;
    let mask_src = SourceRaster::open(mask)?;
    let src_nodata = src.nodata();
    let out_nodata = params.nodata;

    let processor = BlockProcessor::new(*options);
    let inputs = [("input", &src), ("mask", &mask_src)];
    let mut out = processor.create_output::<f32>(&inputs, output, Some(out_nodata))?;

    info!("  copying band to destination file...");
    processor.stream(&inputs, &mut out, progress, |b| {
        Ok(b[0].mapv(|v| {
            if is_nodata(v, src_nodata) {
                out_nodata as f32
            } else {
                v as f32
            }
        }))
    })?;

    let spec = src.spec();
    let max_distance = effective_max_distance(params.max_distance, spec.cols, spec.rows);
    info!(
        "  running FillNodata (max distance {} px, {} smoothing iterations)...",
        max_distance, params.smoothing_iterations
    );
    {
        let target = out.dataset().rasterband(1)?;
        let mask_band = mask_src.band()?;
        let (callback, arg) = progress.gdal_callback();
        // SAFETY: both band handles outlive the call; `arg` borrows `progress`
        let rc = unsafe {
            gdal_sys::GDALFillNodata(
                target.c_rasterband(),
                mask_band.c_rasterband(),
                max_distance,
                0,
                params.smoothing_iterations as i32,
                std::ptr::null_mut(),
                callback,
                arg,
            )
        };
        check_rc(rc, "FillNodata")?;
    }

    out.finish()
}
