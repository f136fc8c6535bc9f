//! Vertical datum conversion of LIDAR elevations
//!
//! Tidal offset grids (TSS and the target tidal datum) are in metres while
//! the LIDAR elevations are in US survey feet, so both offsets are scaled
//! before being applied:
//!
//! ```text
//! out = elevation + tss * 3.280833333 - tidal * 3.280833333
//! ```

use super::{BlockProcessor, RasterOptions};
use crate::maybe_rayon::*;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tidemark_core::io::{Progress, SourceRaster};
use tidemark_core::raster::is_nodata;
use tidemark_core::Result;
use tracing::info;

/// 1 metre in US survey feet
pub const SURVEY_FEET_PER_METER: f64 = 3.280833333;

/// Convert one block of elevations.
///
/// A cell that is nodata in any input becomes `out_nodata`.
pub fn convert_block(
    elevation: &Array2<f64>,
    tss: &Array2<f64>,
    tidal: &Array2<f64>,
    nodata: [Option<f64>; 3],
    out_nodata: f64,
) -> Result<Array2<f32>> {
    let (rows, cols) = elevation.dim();

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![out_nodata as f32; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let e = elevation[[row, col]];
                let s = tss[[row, col]];
                let t = tidal[[row, col]];
                if is_nodata(e, nodata[0]) || is_nodata(s, nodata[1]) || is_nodata(t, nodata[2]) {
                    continue;
                }
                *out = (e + s * SURVEY_FEET_PER_METER - t * SURVEY_FEET_PER_METER) as f32;
            }
            row_data
        })
        .collect();

    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Convert a NAVD88 LIDAR tile into a tidal datum.
///
/// All three rasters must share one cell grid; otherwise the call fails
/// before the output is created. The output keeps the elevation nodata
/// sentinel (-9999 when the tile has none).
pub fn convert_to_tidal_datum(
    elevation: &Path,
    tss: &Path,
    tidal: &Path,
    output: &Path,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    info!("Converting {} to tidal datum -> {}", elevation.display(), output.display());
    let elev = SourceRaster::open(elevation)?;
    let tss = SourceRaster::open(tss)?;
    let tidal = SourceRaster::open(tidal)?;

    let out_nodata = elev.nodata().unwrap_or(-9999.0);
    let nodata = [elev.nodata(), tss.nodata(), tidal.nodata()];

    BlockProcessor::new(*options).run(
        &[("elevation", &elev), ("tss", &tss), ("tidal", &tidal)],
        output,
        Some(out_nodata),
        progress,
        |blocks| convert_block(&blocks[0], &blocks[1], &blocks[2], nodata, out_nodata),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::test_support::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use tempfile::TempDir;
    use tidemark_core::raster::GridSpec;
    use tidemark_core::Error;

    #[test]
    fn test_convert_block_formula() {
        let e = array![[10.0, 20.0]];
        let s = array![[1.0, 1.0]];
        let t = array![[0.5, 2.0]];
        let out = convert_block(&e, &s, &t, [None, None, None], -9999.0).unwrap();
        assert_relative_eq!(out[[0, 0]], (10.0 + 0.5 * SURVEY_FEET_PER_METER) as f32, epsilon = 1e-4);
        assert_relative_eq!(out[[0, 1]], (20.0 - 1.0 * SURVEY_FEET_PER_METER) as f32, epsilon = 1e-4);
    }

    #[test]
    fn test_nodata_in_any_input_propagates() {
        let e = array![[-9999.0, 5.0, 5.0, 5.0]];
        let s = array![[1.0, f64::NAN, 1.0, 1.0]];
        let t = array![[1.0, 1.0, -1.0, 1.0]];
        let out = convert_block(&e, &s, &t, [Some(-9999.0), None, Some(-1.0)], -9999.0).unwrap();
        assert_eq!(out[[0, 0]], -9999.0);
        assert_eq!(out[[0, 1]], -9999.0);
        assert_eq!(out[[0, 2]], -9999.0);
        assert_relative_eq!(out[[0, 3]], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_convert_rejects_misaligned_grids_before_output() {
        let dir = TempDir::new().unwrap();
        let spec = grid(20, 20);
        let mut shifted = spec.clone();
        shifted.transform.origin_x += 3.0;

        let elev = write_raster(&dir.path().join("elev.tif"), &spec, Some(-9999.0), |_, _| 5.0);
        let tss = write_raster(&dir.path().join("tss.tif"), &spec, None, |_, _| 1.0);
        let tidal = write_raster(&dir.path().join("tidal.tif"), &shifted, None, |_, _| 0.5);

        let output = dir.path().join("converted.tif");
        let err = convert_to_tidal_datum(&elev, &tss, &tidal, &output, &gtiff_options(8), &Progress::hidden())
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { what: "origin", .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_convert_rejects_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let spec = grid(20, 20);
        let small = GridSpec::new(20, 19, spec.transform, "");

        let elev = write_raster(&dir.path().join("elev.tif"), &spec, None, |_, _| 5.0);
        let tss = write_raster(&dir.path().join("tss.tif"), &small, None, |_, _| 1.0);
        let tidal = write_raster(&dir.path().join("tidal.tif"), &spec, None, |_, _| 0.5);

        let output = dir.path().join("converted.tif");
        let err = convert_to_tidal_datum(&elev, &tss, &tidal, &output, &gtiff_options(8), &Progress::hidden())
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { what: "row count", .. }));
        assert!(!output.exists());
    }
}
