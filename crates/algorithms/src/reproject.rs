//! Window extraction, reprojection and snap-to-template resampling
//!
//! The warping itself is `GDALReprojectImage`; this module only decides
//! which cells go in and which grid comes out.

use crate::algebra::RasterOptions;
use gdal::raster::GdalDataType;
use gdal::Dataset;
use gdal_sys::GDALResampleAlg;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tidemark_core::io::ffi::{c_string, check_rc};
use tidemark_core::io::{OutputRaster, Progress, SourceRaster};
use tidemark_core::raster::{BlockWindow, GeoTransform, GridSpec, RasterElement};
use tidemark_core::{Error, Result, CRS};
use tracing::{debug, info};

/// Resampling kernel used when warping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
}

impl ResampleMethod {
    fn to_gdal(self) -> GDALResampleAlg::Type {
        match self {
            ResampleMethod::Nearest => GDALResampleAlg::GRA_NearestNeighbour,
            ResampleMethod::Bilinear => GDALResampleAlg::GRA_Bilinear,
            ResampleMethod::Cubic => GDALResampleAlg::GRA_Cubic,
            ResampleMethod::CubicSpline => GDALResampleAlg::GRA_CubicSpline,
            ResampleMethod::Lanczos => GDALResampleAlg::GRA_Lanczos,
            ResampleMethod::Average => GDALResampleAlg::GRA_Average,
        }
    }
}

impl std::str::FromStr for ResampleMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "near" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            "cubic" => Ok(ResampleMethod::Cubic),
            "cubicspline" => Ok(ResampleMethod::CubicSpline),
            "lanczos" => Ok(ResampleMethod::Lanczos),
            "average" => Ok(ResampleMethod::Average),
            other => Err(Error::InvalidParameter {
                name: "resample",
                value: other.to_string(),
                reason: "unknown resampling method".into(),
            }),
        }
    }
}

/// Warp settings shared by all reprojection entry points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectParams {
    pub method: ResampleMethod,
    /// Override of the source CRS
    pub source_epsg: Option<u32>,
    /// Override of the destination CRS
    pub target_epsg: Option<u32>,
    /// Warp memory limit in megabytes
    pub memory_limit_mb: f64,
}

impl Default for ReprojectParams {
    fn default() -> Self {
        Self {
            method: ResampleMethod::Nearest,
            source_epsg: None,
            target_epsg: None,
            memory_limit_mb: 500.0,
        }
    }
}

impl ReprojectParams {
    pub fn with_method(method: ResampleMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    fn source_wkt(&self, dataset_projection: &str) -> Result<String> {
        match self.source_epsg {
            Some(code) => CRS::from_epsg(code).to_wkt(),
            None => Ok(dataset_projection.to_string()),
        }
    }

    fn target_wkt(&self, fallback: &str) -> Result<String> {
        match self.target_epsg {
            Some(code) => CRS::from_epsg(code).to_wkt(),
            None => Ok(fallback.to_string()),
        }
    }
}

/// World-coordinate window given by its corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl WindowBounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }
}

fn warp(
    src: &Dataset,
    src_wkt: &str,
    dst: &Dataset,
    dst_wkt: &str,
    params: &ReprojectParams,
    progress: &Progress,
) -> Result<()> {
    let src_wkt = c_string(src_wkt)?;
    let dst_wkt = c_string(dst_wkt)?;
    let (callback, arg) = progress.gdal_callback();
    // SAFETY: dataset handles and C strings live until the call returns
    let rc = unsafe {
        gdal_sys::GDALReprojectImage(
            src.c_dataset(),
            src_wkt.as_ptr(),
            dst.c_dataset(),
            dst_wkt.as_ptr(),
            params.method.to_gdal(),
            params.memory_limit_mb,
            0.0,
            callback,
            arg,
            std::ptr::null_mut(),
        )
    };
    check_rc(rc, "ReprojectImage")
}

/// Resolve a pixel window of `src`, failing when it leaves the raster
fn source_window(src: &SourceRaster, col: i64, row: i64, cols: i64, rows: i64) -> Result<BlockWindow> {
    let spec = src.spec();
    let outside = col < 0
        || row < 0
        || cols <= 0
        || rows <= 0
        || (col + cols) as usize > spec.cols
        || (row + rows) as usize > spec.rows;
    if outside {
        return Err(Error::WindowOutOfBounds {
            col,
            row,
            cols,
            rows,
            raster_cols: spec.cols,
            raster_rows: spec.rows,
        });
    }
    Ok(BlockWindow::new(col as usize, row as usize, cols as usize, rows as usize))
}

/// Stage a source window into an in-memory raster, then warp it onto `target`.
fn reproject_pixel_window<T: RasterElement>(
    src: &SourceRaster,
    window: BlockWindow,
    target: GridSpec,
    params: &ReprojectParams,
    progress: &Progress,
) -> Result<SourceRaster> {
    let spec = src.spec();
    let staged_transform = spec.transform.window(window.col_offset as i64, window.row_offset as i64);
    let staged_spec = spec.with_size(window.cols, window.rows, staged_transform);

    let block = src.read_block(&window)?;
    let mut staged = OutputRaster::<T>::in_memory(&staged_spec, src.nodata())?;
    staged.write_block(
        &BlockWindow::full(window.cols, window.rows),
        &block.mapv(T::from_f64_lossy),
    )?;
    let staged = staged.finish_into_dataset()?;

    let src_wkt = params.source_wkt(&spec.projection)?;
    let dst_wkt = params.target_wkt(&src_wkt)?;
    let target = GridSpec {
        projection: dst_wkt.clone(),
        ..target
    };

    let nodata = src.nodata().unwrap_or(T::default_nodata().as_f64());
    let mut out = OutputRaster::<T>::in_memory(&target, Some(nodata))?;
    out.fill(nodata)?;
    warp(&staged, &src_wkt, out.dataset(), &dst_wkt, params, progress)?;
    SourceRaster::from_dataset(out.finish_into_dataset()?, format!("{} (window)", src.label()))
}

fn dispatch_window(
    src: &SourceRaster,
    window: BlockWindow,
    target: GridSpec,
    params: &ReprojectParams,
    progress: &Progress,
) -> Result<SourceRaster> {
    match src.band_type()? {
        GdalDataType::UInt8 => reproject_pixel_window::<u8>(src, window, target, params, progress),
        GdalDataType::Float64 => reproject_pixel_window::<f64>(src, window, target, params, progress),
        _ => reproject_pixel_window::<f32>(src, window, target, params, progress),
    }
}

/// Extract the window between two corners and resample it to `cell_size`.
///
/// The result is an in-memory raster whose origin is the window's top-left
/// corner.
pub fn reproject_window(
    src: &SourceRaster,
    bounds: WindowBounds,
    cell_size: f64,
    params: &ReprojectParams,
    progress: &Progress,
) -> Result<SourceRaster> {
    validate_cell_size(cell_size)?;
    let gt = src.spec().transform;
    let (left, top) = gt.world_to_pixel(bounds.min_x, bounds.max_y);
    let (right, bottom) = gt.world_to_pixel(bounds.max_x, bounds.min_y);
    debug!(
        "  window pixels: left {} right {} top {} bottom {}",
        left, right, top, bottom
    );
    let window = source_window(src, left, top, right - left, bottom - top)?;

    let target_gt = GeoTransform::new(
        bounds.min_x,
        bounds.max_y,
        cell_size.copysign(gt.pixel_width),
        cell_size.copysign(gt.pixel_height),
    );
    let (cols, rows) = target_gt.world_to_pixel(bounds.max_x, bounds.min_y);
    let target = src.spec().with_size(cols.max(1) as usize, rows.max(1) as usize, target_gt);
    dispatch_window(src, window, target, params, progress)
}

/// Extract `cols` x `rows` source pixels starting at `top_left` and resample
/// them to `cell_size`.
pub fn reproject_window_offset(
    src: &SourceRaster,
    top_left: (f64, f64),
    cols: usize,
    rows: usize,
    cell_size: f64,
    params: &ReprojectParams,
    progress: &Progress,
) -> Result<SourceRaster> {
    validate_cell_size(cell_size)?;
    let gt = src.spec().transform;
    let (col, row) = gt.world_to_pixel(top_left.0, top_left.1);
    let window = source_window(src, col, row, cols as i64, rows as i64)?;

    let (x, y) = gt.pixel_to_world(col, row);
    let target_gt = GeoTransform::new(
        x,
        y,
        cell_size.copysign(gt.pixel_width),
        cell_size.copysign(gt.pixel_height),
    );
    let out_cols = ((cols as f64 * gt.pixel_width.abs() / cell_size).trunc() as usize).max(1);
    let out_rows = ((rows as f64 * gt.pixel_height.abs() / cell_size).trunc() as usize).max(1);
    let target = src.spec().with_size(out_cols, out_rows, target_gt);
    dispatch_window(src, window, target, params, progress)
}

fn validate_cell_size(cell_size: f64) -> Result<()> {
    if cell_size > 0.0 && cell_size.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: "cell_size",
            value: cell_size.to_string(),
            reason: "must be positive".into(),
        })
    }
}

fn warp_to_template<T: RasterElement>(
    src: &SourceRaster,
    template: &GridSpec,
    output: &Path,
    params: &ReprojectParams,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    let src_wkt = params.source_wkt(&src.spec().projection)?;
    let dst_wkt = match params.target_epsg {
        Some(code) => CRS::from_epsg(code).to_wkt()?,
        None if !template.projection.is_empty() => template.projection.clone(),
        None => src_wkt.clone(),
    };
    let target = GridSpec {
        projection: dst_wkt.clone(),
        ..template.clone()
    };

    let nodata = src.nodata().unwrap_or(T::default_nodata().as_f64());
    let mut out = OutputRaster::<T>::create(options.format, output, &target, Some(nodata))?;
    out.fill(nodata)?;
    warp(src.dataset(), &src_wkt, out.dataset(), &dst_wkt, params, progress)?;
    out.finish()
}

/// Resample `src` onto exactly the extent, cell size and size of `template`.
pub fn reproject_to_template(
    src: &Path,
    template: &Path,
    output: &Path,
    params: &ReprojectParams,
    options: &RasterOptions,
    progress: &Progress,
) -> Result<PathBuf> {
    info!(
        "Warping {} onto {} ({:?}) -> {}",
        src.display(),
        template.display(),
        params.method,
        output.display()
    );
    let source = SourceRaster::open(src)?;
    let template = SourceRaster::open(template)?.spec().clone();

    match source.band_type()? {
        GdalDataType::UInt8 => warp_to_template::<u8>(&source, &template, output, params, options, progress),
        GdalDataType::Float64 => warp_to_template::<f64>(&source, &template, output, params, options, progress),
        _ => warp_to_template::<f32>(&source, &template, output, params, options, progress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::test_support::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;
    use tidemark_core::CRS;

    fn oregon_grid(cols: usize, rows: usize, cell: f64) -> GridSpec {
        let wkt = CRS::oregon_lambert().to_wkt().unwrap();
        GridSpec::new(cols, rows, GeoTransform::new(7_000_000.0, 700_000.0, cell, -cell), wkt)
    }

    #[test]
    fn test_resample_method_parsing() {
        assert_eq!("bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert_eq!("NEAR".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert!("sinc".parse::<ResampleMethod>().is_err());
    }

    #[test]
    fn test_snap_to_template_matches_grid() {
        let dir = TempDir::new().unwrap();
        // Coarse 30 ft grid covering the 3 ft template
        let coarse = oregon_grid(10, 10, 30.0);
        let fine = oregon_grid(50, 40, 3.0);
        let src = write_raster(&dir.path().join("tss.tif"), &coarse, Some(-9999.0), |_, _| 1.25);
        let template = write_raster(&dir.path().join("tile.tif"), &fine, Some(-9999.0), |_, _| 0.0);

        let out = reproject_to_template(
            &src,
            &template,
            &dir.path().join("tss_tile.tif"),
            &ReprojectParams::with_method(ResampleMethod::Bilinear),
            &gtiff_options(16),
            &Progress::hidden(),
        )
        .unwrap();

        let result = SourceRaster::open(&out).unwrap();
        assert_eq!(result.spec().cols, 50);
        assert_eq!(result.spec().rows, 40);
        assert_eq!(result.spec().transform, fine.transform);
        let data = read_all(&out);
        for v in data.iter() {
            assert_relative_eq!(*v, 1.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_uncovered_cells_are_nodata() {
        let dir = TempDir::new().unwrap();
        let small = oregon_grid(5, 5, 3.0);
        let big = oregon_grid(10, 5, 3.0);
        let src = write_raster(&dir.path().join("grid.tif"), &small, Some(-9999.0), |_, _| 4.0);
        let template = write_raster(&dir.path().join("tile.tif"), &big, None, |_, _| 0.0);

        let out = reproject_to_template(
            &src,
            &template,
            &dir.path().join("out.tif"),
            &ReprojectParams::default(),
            &gtiff_options(16),
            &Progress::hidden(),
        )
        .unwrap();
        let data = read_all(&out);
        assert_eq!(data[[2, 2]], 4.0);
        assert_eq!(data[[2, 8]], -9999.0);
    }

    #[test]
    fn test_window_offset_resamples_to_cell_size() {
        let dir = TempDir::new().unwrap();
        let spec = oregon_grid(20, 20, 3.0);
        let path = write_raster(&dir.path().join("grid.tif"), &spec, None, |r, c| (r * 20 + c) as f32);
        let src = SourceRaster::open(&path).unwrap();

        let (x, y) = spec.transform.pixel_to_world(4, 6);
        let win = reproject_window_offset(&src, (x, y), 5, 5, 1.0, &ReprojectParams::default(), &Progress::hidden())
            .unwrap();

        assert_eq!(win.spec().cols, 15);
        assert_eq!(win.spec().rows, 15);
        assert_relative_eq!(win.spec().transform.origin_x, x);
        assert_relative_eq!(win.spec().transform.origin_y, y);
        let data = win.read_block(&BlockWindow::full(15, 15)).unwrap();
        // Nearest neighbour: each 3x3 group of output cells repeats one source cell
        assert_eq!(data[[0, 0]], (6 * 20 + 4) as f64);
        assert_eq!(data[[14, 14]], (10 * 20 + 8) as f64);
    }

    #[test]
    fn test_window_offset_keeps_rectangular_pixels() {
        let dir = TempDir::new().unwrap();
        let wkt = CRS::oregon_lambert().to_wkt().unwrap();
        // 3 ft wide, 2 ft tall source cells
        let spec = GridSpec::new(20, 20, GeoTransform::new(7_000_000.0, 700_000.0, 3.0, -2.0), wkt);
        let path = write_raster(&dir.path().join("grid.tif"), &spec, None, |r, c| (r * 20 + c) as f32);
        let src = SourceRaster::open(&path).unwrap();

        let (x, y) = spec.transform.pixel_to_world(4, 6);
        let win = reproject_window_offset(&src, (x, y), 5, 5, 1.0, &ReprojectParams::default(), &Progress::hidden())
            .unwrap();

        assert_eq!((win.spec().cols, win.spec().rows), (15, 10));
        assert_relative_eq!(win.spec().transform.origin_y, y);
        let data = win.read_block(&BlockWindow::full(15, 10)).unwrap();
        assert_eq!(data[[0, 0]], (6 * 20 + 4) as f64);
        // Row 9 is 9 ft down: source row 6 + 4, column 14 is 14 ft right: source col 4 + 4
        assert_eq!(data[[9, 14]], (10 * 20 + 8) as f64);
        assert_eq!(data[[2, 3]], (7 * 20 + 5) as f64);
    }

    #[test]
    fn test_window_by_bounds() {
        let dir = TempDir::new().unwrap();
        let spec = oregon_grid(20, 20, 3.0);
        let path = write_raster(&dir.path().join("grid.tif"), &spec, None, |_, c| c as f32);
        let src = SourceRaster::open(&path).unwrap();

        let (min_x, max_y) = spec.transform.pixel_to_world(2, 2);
        let (max_x, min_y) = spec.transform.pixel_to_world(12, 8);
        let win = reproject_window(
            &src,
            WindowBounds::new(min_x, max_x, min_y, max_y),
            6.0,
            &ReprojectParams::default(),
            &Progress::hidden(),
        )
        .unwrap();
        assert_eq!((win.spec().cols, win.spec().rows), (5, 3));
    }

    #[test]
    fn test_window_outside_source_rejected() {
        let dir = TempDir::new().unwrap();
        let spec = oregon_grid(10, 10, 3.0);
        let path = write_raster(&dir.path().join("grid.tif"), &spec, None, |_, _| 1.0);
        let src = SourceRaster::open(&path).unwrap();

        let (x, y) = spec.transform.pixel_to_world(8, 0);
        let err = reproject_window_offset(&src, (x, y), 5, 5, 3.0, &ReprojectParams::default(), &Progress::hidden())
            .unwrap_err();
        assert!(matches!(err, Error::WindowOutOfBounds { .. }));

        let (x, y) = spec.transform.pixel_to_world(-1, 0);
        assert!(reproject_window_offset(&src, (x, y), 2, 2, 3.0, &ReprojectParams::default(), &Progress::hidden()).is_err());
    }
}
