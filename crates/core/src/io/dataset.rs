//! Scoped GDAL raster handles for block-wise reading and writing

use crate::error::{Error, Result};
use crate::io::ffi::check_rc;
use crate::raster::{BlockWindow, GeoTransform, GridSpec, RasterElement};
use gdal::raster::{Buffer, GdalDataType, RasterBand};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Overview levels built on every persisted output raster
pub const OVERVIEW_LEVELS: [i32; 7] = [2, 4, 8, 16, 32, 64, 128];

/// Raster container format for outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Erdas Imagine (`.img`)
    #[default]
    Hfa,
    /// GeoTIFF (`.tif`)
    GTiff,
    /// In-memory raster, never persisted
    Mem,
}

impl OutputFormat {
    pub fn driver_name(&self) -> &'static str {
        match self {
            OutputFormat::Hfa => "HFA",
            OutputFormat::GTiff => "GTiff",
            OutputFormat::Mem => "MEM",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Hfa => "img",
            OutputFormat::GTiff => "tif",
            OutputFormat::Mem => "",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Hfa => "hfa",
            OutputFormat::GTiff => "gtiff",
            OutputFormat::Mem => "mem",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hfa" | "img" => Ok(OutputFormat::Hfa),
            "gtiff" | "tif" | "tiff" => Ok(OutputFormat::GTiff),
            "mem" => Ok(OutputFormat::Mem),
            other => Err(Error::InvalidParameter {
                name: "format",
                value: other.to_string(),
                reason: "expected one of hfa, gtiff, mem".into(),
            }),
        }
    }
}

/// Summary statistics of band 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Exact statistics over the valid cells of a band.
///
/// Fails when the band has no valid cell.
pub fn compute_statistics(band: &RasterBand) -> Result<BandStatistics> {
    let mut stats = BandStatistics {
        min: 0.0,
        max: 0.0,
        mean: 0.0,
        std_dev: 0.0,
    };
    // SAFETY: the band handle is valid for the lifetime of `band`
    let rc = unsafe {
        gdal_sys::GDALComputeRasterStatistics(
            band.c_rasterband(),
            0,
            &mut stats.min,
            &mut stats.max,
            &mut stats.mean,
            &mut stats.std_dev,
            None,
            std::ptr::null_mut(),
        )
    };
    check_rc(rc, "ComputeRasterStatistics")?;
    Ok(stats)
}

/// Size of a file in megabytes, 0 when it cannot be read
pub fn file_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Remove a raster and its sidecar files if present
pub fn delete_raster(format: OutputFormat, path: &Path) -> Result<()> {
    if format == OutputFormat::Mem || !path.exists() {
        return Ok(());
    }
    debug!("Deleting existing raster {}", path.display());
    let driver = DriverManager::get_driver_by_name(format.driver_name())?;
    if driver.delete(path).is_err() {
        std::fs::remove_file(path)?;
    }
    let aux = PathBuf::from(format!("{}.aux.xml", path.display()));
    if aux.exists() {
        std::fs::remove_file(aux)?;
    }
    Ok(())
}

/// A read-only raster opened for block access to band 1.
#[derive(Debug)]
pub struct SourceRaster {
    label: String,
    dataset: Dataset,
    spec: GridSpec,
    nodata: Option<f64>,
}

impl SourceRaster {
    /// Open a raster file read-only
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingArtifact(path.to_path_buf()));
        }
        let dataset = Dataset::open(path)?;
        Self::from_dataset(dataset, path.display().to_string())
    }

    /// Wrap an already open dataset (e.g. an in-memory one)
    pub fn from_dataset(dataset: Dataset, label: impl Into<String>) -> Result<Self> {
        if dataset.raster_count() < 1 {
            return Err(Error::MissingBand(1));
        }
        let (cols, rows) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let spec = GridSpec::new(cols, rows, transform, dataset.projection());
        let nodata = dataset.rasterband(1)?.no_data_value();
        Ok(Self {
            label: label.into(),
            dataset,
            spec,
            nodata,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn band(&self) -> Result<RasterBand<'_>> {
        Ok(self.dataset.rasterband(1)?)
    }

    pub fn band_type(&self) -> Result<GdalDataType> {
        Ok(self.band()?.band_type())
    }

    /// Whether `window` lies inside the raster
    pub fn contains(&self, window: &BlockWindow) -> bool {
        window.col_offset + window.cols <= self.spec.cols
            && window.row_offset + window.rows <= self.spec.rows
    }

    /// Read a block of band 1 as `f64`, shaped (rows, cols)
    pub fn read_block(&self, window: &BlockWindow) -> Result<Array2<f64>> {
        if !self.contains(window) {
            return Err(Error::WindowOutOfBounds {
                col: window.col_offset as i64,
                row: window.row_offset as i64,
                cols: window.cols as i64,
                rows: window.rows as i64,
                raster_cols: self.spec.cols,
                raster_rows: self.spec.rows,
            });
        }
        let buffer = self
            .band()?
            .read_as::<f64>(window.offset(), window.size(), window.size(), None)?;
        Ok(Array2::from_shape_vec(
            (window.rows, window.cols),
            buffer.data().to_vec(),
        )?)
    }

    pub fn statistics(&self) -> Result<BandStatistics> {
        compute_statistics(&self.band()?)
    }
}

/// A freshly created single-band raster of cell type `T`.
///
/// Any existing file at the path is deleted first. Blocks are flushed as
/// they are written; `finish` computes statistics and builds overviews.
pub struct OutputRaster<T: RasterElement> {
    path: PathBuf,
    format: OutputFormat,
    dataset: Dataset,
    spec: GridSpec,
    nodata: Option<f64>,
    _marker: PhantomData<T>,
}

impl<T: RasterElement> OutputRaster<T> {
    pub fn create(
        format: OutputFormat,
        path: &Path,
        spec: &GridSpec,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if spec.cols == 0 || spec.rows == 0 {
            return Err(Error::InvalidDimensions {
                width: spec.cols,
                height: spec.rows,
            });
        }
        delete_raster(format, path)?;

        let driver = DriverManager::get_driver_by_name(format.driver_name())?;
        let target: &Path = if format == OutputFormat::Mem {
            Path::new("")
        } else {
            path
        };
        let mut dataset =
            driver.create_with_band_type::<T, _>(target, spec.cols, spec.rows, 1)?;
        dataset.set_geo_transform(&spec.transform.to_gdal())?;
        if !spec.projection.is_empty() {
            dataset.set_projection(&spec.projection)?;
        }
        if let Some(nd) = nodata {
            dataset.rasterband(1)?.set_no_data_value(Some(nd))?;
        }
        debug!(
            "Created {} raster {} ({}x{})",
            format.driver_name(),
            path.display(),
            spec.cols,
            spec.rows
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            dataset,
            spec: spec.clone(),
            nodata,
            _marker: PhantomData,
        })
    }

    /// In-memory raster on the given grid
    pub fn in_memory(spec: &GridSpec, nodata: Option<f64>) -> Result<Self> {
        Self::create(OutputFormat::Mem, Path::new(""), spec, nodata)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Set every cell of band 1 to `value`
    pub fn fill(&mut self, value: f64) -> Result<()> {
        self.dataset.rasterband(1)?.fill(value, None)?;
        Ok(())
    }

    /// Write a (rows, cols) block at `window` and flush it to disk
    pub fn write_block(&mut self, window: &BlockWindow, block: &Array2<T>) -> Result<()> {
        if block.dim() != (window.rows, window.cols) {
            return Err(Error::InvalidDimensions {
                width: block.ncols(),
                height: block.nrows(),
            });
        }
        let data: Vec<T> = block.iter().copied().collect();
        let mut buffer = Buffer::new(window.size(), data);
        {
            let mut band = self.dataset.rasterband(1)?;
            band.write(window.offset(), window.size(), &mut buffer)?;
        }
        self.dataset.flush_cache()?;
        Ok(())
    }

    /// Compute statistics and build overviews, then close the dataset.
    ///
    /// Statistics failure (e.g. an all-nodata raster) is logged and the
    /// raster kept.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.finalize()?;
        Ok(self.path)
    }

    /// Finalize but keep the dataset open (for in-memory rasters)
    pub fn finish_into_dataset(mut self) -> Result<Dataset> {
        self.finalize()?;
        Ok(self.dataset)
    }

    fn finalize(&mut self) -> Result<()> {
        if let Err(e) = compute_statistics(&self.dataset.rasterband(1)?) {
            warn!("Could not compute statistics for {}: {}", self.path.display(), e);
        }
        if self.format != OutputFormat::Mem {
            self.dataset.build_overviews("NEAREST", &OVERVIEW_LEVELS, &[])?;
        }
        self.dataset.flush_cache()?;
        Ok(())
    }
}
