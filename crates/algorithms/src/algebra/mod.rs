//! Block-wise raster algebra over co-registered rasters
//!
//! Every transform in this module follows the same shape: check that all
//! inputs share one cell grid, create a fresh output on that grid, then walk
//! a fixed block tiling over the inputs in lock-step, applying a per-block
//! kernel and flushing each result block as it is written.

pub mod datum;
pub mod threshold;

pub use datum::{convert_block, convert_to_tidal_datum, SURVEY_FEET_PER_METER};
pub use threshold::{
    classify_below_hmt, threshold_block_gridded, threshold_block_scalar, HmtThreshold,
    BINARY_NODATA,
};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tidemark_core::io::{OutputFormat, OutputRaster, Progress, SourceRaster};
use tidemark_core::raster::{ensure_coregistered, BlockSize, BlockTiling, RasterElement};
use tidemark_core::{Error, Result};
use tracing::debug;

/// Output format and block size shared by the raster stages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RasterOptions {
    pub format: OutputFormat,
    pub block: BlockSize,
}

/// Streams co-registered inputs through a per-block kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockProcessor {
    options: RasterOptions,
}

impl BlockProcessor {
    pub fn new(options: RasterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Check co-registration, then create the output on the first input's grid.
    ///
    /// Nothing is written to disk when the inputs do not line up.
    pub fn create_output<T: RasterElement>(
        &self,
        inputs: &[(&str, &SourceRaster)],
        output_path: &Path,
        nodata: Option<f64>,
    ) -> Result<OutputRaster<T>> {
        let Some((_, reference)) = inputs.first() else {
            return Err(Error::InvalidParameter {
                name: "inputs",
                value: "[]".into(),
                reason: "at least one input raster is required".into(),
            });
        };
        let grids: Vec<_> = inputs.iter().map(|(name, src)| (*name, src.spec())).collect();
        ensure_coregistered(&grids)?;
        OutputRaster::create(self.options.format, output_path, reference.spec(), nodata)
    }

    /// Feed every block of the inputs through `kernel` into `output`.
    ///
    /// The kernel receives one `(rows, cols)` array per input, in input order.
    pub fn stream<T, F>(
        &self,
        inputs: &[(&str, &SourceRaster)],
        output: &mut OutputRaster<T>,
        progress: &Progress,
        kernel: F,
    ) -> Result<()>
    where
        T: RasterElement,
        F: Fn(&[Array2<f64>]) -> Result<Array2<T>>,
    {
        let spec = output.spec().clone();
        let tiling = BlockTiling::new(spec.cols, spec.rows, self.options.block);
        debug!(
            "  {} blocks of {}x{} over {}x{}",
            tiling.block_count(),
            self.options.block.cols(),
            self.options.block.rows(),
            spec.cols,
            spec.rows
        );
        progress.start(tiling.block_count() as u64, "blocks");

        for window in tiling {
            debug!(
                "    Working on block offset ({}, {}); cols {}; rows {}",
                window.col_offset, window.row_offset, window.cols, window.rows
            );
            let blocks = inputs
                .iter()
                .map(|(_, src)| src.read_block(&window))
                .collect::<Result<Vec<_>>>()?;
            let result = kernel(&blocks)?;
            output.write_block(&window, &result)?;
            progress.inc(1);
        }
        Ok(())
    }

    /// Create, stream and finalize in one go; returns the output path.
    pub fn run<T, F>(
        &self,
        inputs: &[(&str, &SourceRaster)],
        output_path: &Path,
        nodata: Option<f64>,
        progress: &Progress,
        kernel: F,
    ) -> Result<PathBuf>
    where
        T: RasterElement,
        F: Fn(&[Array2<f64>]) -> Result<Array2<T>>,
    {
        let mut output = self.create_output::<T>(inputs, output_path, nodata)?;
        self.stream(inputs, &mut output, progress, kernel)?;
        output.finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stream_visits_every_cell_once() {
        let dir = TempDir::new().unwrap();
        let spec = grid(23, 11);
        let input = write_raster(&dir.path().join("in.tif"), &spec, None, |r, c| (r * 23 + c) as f32);
        let src = SourceRaster::open(&input).unwrap();

        let processor = BlockProcessor::new(gtiff_options(5));
        let out = processor
            .run::<f32, _>(&[("in", &src)], &dir.path().join("out.tif"), None, &Progress::hidden(), |b| {
                Ok(b[0].mapv(|v| (v + 1.0) as f32))
            })
            .unwrap();

        let result = read_all(&out);
        for ((r, c), v) in result.indexed_iter() {
            assert_eq!(*v, (r * 23 + c + 1) as f64);
        }
    }

    #[test]
    fn test_mismatch_creates_no_output() {
        let dir = TempDir::new().unwrap();
        let a = write_raster(&dir.path().join("a.tif"), &grid(10, 10), None, |_, _| 1.0);
        let b = write_raster(&dir.path().join("b.tif"), &grid(10, 12), None, |_, _| 1.0);
        let (a, b) = (SourceRaster::open(&a).unwrap(), SourceRaster::open(&b).unwrap());

        let out_path = dir.path().join("out.tif");
        let err = BlockProcessor::new(gtiff_options(4))
            .run::<f32, _>(&[("a", &a), ("b", &b)], &out_path, None, &Progress::hidden(), |blocks| {
                Ok(blocks[0].mapv(|v| v as f32))
            })
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));
        assert!(!out_path.exists());
    }

    #[test]
    fn test_no_inputs_rejected() {
        let dir = TempDir::new().unwrap();
        let result = BlockProcessor::default().create_output::<u8>(&[], &dir.path().join("x.img"), None);
        assert!(result.is_err());
    }
}
