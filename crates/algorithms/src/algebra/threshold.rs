//! Below-HMT classification
//!
//! Produces a Byte raster holding 1 where the elevation is at or below the
//! Highest Measured Tide and 0 elsewhere. 0 is also the nodata sentinel, so
//! polygonizing the result only traces below-HMT regions.

use super::{BlockProcessor, RasterOptions};
use crate::maybe_rayon::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tidemark_core::io::{Progress, SourceRaster};
use tidemark_core::raster::is_nodata;
use tidemark_core::Result;
use tracing::info;

/// Nodata sentinel of binary rasters
pub const BINARY_NODATA: f64 = 0.0;

/// Where the HMT threshold comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmtThreshold {
    /// One value for the whole tile, in the tile's vertical datum
    Scalar(f64),
    /// A raster co-registered with the tile, compared cell by cell
    Gridded(PathBuf),
}

impl fmt::Display for HmtThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HmtThreshold::Scalar(v) => write!(f, "HMT = {}", v),
            HmtThreshold::Gridded(p) => write!(f, "HMT grid {}", p.display()),
        }
    }
}

/// Classify a block against a single threshold
pub fn threshold_block_scalar(values: &Array2<f64>, nodata: Option<f64>, hmt: f64) -> Result<Array2<u8>> {
    let (rows, cols) = values.dim();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = values[[row, col]];
                if !is_nodata(v, nodata) && v <= hmt {
                    *out = 1;
                }
            }
            row_data
        })
        .collect();

    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Classify a block against a co-registered threshold block.
///
/// Nodata in either the values or the threshold grid gives 0.
pub fn threshold_block_gridded(
    values: &Array2<f64>,
    nodata: Option<f64>,
    hmt: &Array2<f64>,
    hmt_nodata: Option<f64>,
) -> Result<Array2<u8>> {
    let (rows, cols) = values.dim();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = values[[row, col]];
                let h = hmt[[row, col]];
                if is_nodata(v, nodata) || is_nodata(h, hmt_nodata) {
                    continue;
                }
                if v <= h {
                    *out = 1;
                }
            }
            row_data
        })
        .collect();

    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Write the below-HMT binary raster of `input`.
pub fn classify_below_hmt(
    input: &Path,
    threshold: &HmtThreshold,
    output: &Path,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    info!("Classifying {} against {} -> {}", input.display(), threshold, output.display());
    let src = SourceRaster::open(input)?;
    let nodata = src.nodata();
    let processor = BlockProcessor::new(*options);

    match threshold {
        HmtThreshold::Scalar(hmt) => {
            let hmt = *hmt;
            processor.run(&[("elevation", &src)], output, Some(BINARY_NODATA), progress, |blocks| {
                threshold_block_scalar(&blocks[0], nodata, hmt)
            })
        }
        HmtThreshold::Gridded(grid) => {
            let hmt = SourceRaster::open(grid)?;
            let hmt_nodata = hmt.nodata();
            processor.run(
                &[("elevation", &src), ("hmt", &hmt)],
                output,
                Some(BINARY_NODATA),
                progress,
                |blocks| threshold_block_gridded(&blocks[0], nodata, &blocks[1], hmt_nodata),
            )
        }
    }
}
