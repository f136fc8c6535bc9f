//! Per-tile HMT processing chain
//!
//! For each datum run of a tile: warp the tidal correction grids onto the
//! tile, convert the elevations into the datum, classify cells at or below
//! the HMT, polygonize the result and drop the intermediate binary raster.

use crate::aggregate::TileVector;
use crate::algebra::{classify_below_hmt, convert_to_tidal_datum, HmtThreshold, RasterOptions};
use crate::polygonize::binary_raster_to_vector;
use crate::reproject::{reproject_to_template, ReprojectParams, ResampleMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tidemark_core::io::{delete_raster, file_size_mb, Progress};
use tidemark_core::{Error, Result};
use tracing::{debug, info};

/// Vertical reference a tile is classified in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Datum {
    /// Mean Higher High Water
    Mhhw,
    /// Mean Lower Low Water
    Mllw,
    /// The LIDAR's native datum; no conversion needed
    Navd88,
}

impl Datum {
    pub const ALL: [Datum; 3] = [Datum::Mhhw, Datum::Mllw, Datum::Navd88];

    /// Lower-case name used in file names
    pub fn label(&self) -> &'static str {
        match self {
            Datum::Mhhw => "mhhw",
            Datum::Mllw => "mllw",
            Datum::Navd88 => "navd88",
        }
    }

    /// Whether elevations must be converted before thresholding
    pub fn is_tidal(&self) -> bool {
        !matches!(self, Datum::Navd88)
    }

    /// Published scalar HMT in this datum, in feet
    pub fn scalar_hmt(&self) -> Option<f64> {
        match self {
            Datum::Mhhw => None,
            Datum::Mllw => Some(11.62),
            Datum::Navd88 => Some(11.23),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label().to_ascii_uppercase())
    }
}

impl FromStr for Datum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mhhw" => Ok(Datum::Mhhw),
            "mllw" => Ok(Datum::Mllw),
            "navd88" => Ok(Datum::Navd88),
            other => Err(Error::InvalidParameter {
                name: "datum",
                value: other.to_string(),
                reason: "expected MHHW, MLLW or NAVD88".into(),
            }),
        }
    }
}

/// Shapefile of a tile's below-HMT polygons
pub fn tile_vector_path(shp_dir: &Path, tile: &str, datum: Datum) -> PathBuf {
    shp_dir.join(format!("{}_belowHMT_via{}.shp", tile, datum))
}

/// One datum to classify a tile in
#[derive(Debug, Clone, PartialEq)]
pub struct DatumRun {
    pub datum: Datum,
    /// Tidal offset grid (metres); required for tidal datums
    pub tidal_grid: Option<PathBuf>,
    /// HMT source: scalar, or a grid to be warped onto the tile
    pub hmt: HmtThreshold,
}

/// Everything needed to process one LIDAR tile
#[derive(Debug, Clone)]
pub struct TileJob {
    pub region: String,
    pub tile: String,
    /// Raw NAVD88 elevation raster (also the template grid)
    pub raw: PathBuf,
    pub processed_dir: PathBuf,
    pub shp_dir: PathBuf,
    /// Topography-of-the-sea-surface offset grid (metres)
    pub tss_grid: PathBuf,
    pub runs: Vec<DatumRun>,
    pub options: RasterOptions,
    pub memory_limit_mb: f64,
    /// Keep the binary raster after polygonizing
    pub keep_binary: bool,
}

/// Polygon output of one datum run
#[derive(Debug, Clone, PartialEq)]
pub struct DatumOutput {
    pub datum: Datum,
    pub vector: PathBuf,
    pub features: u64,
}

/// Result of a processed tile
#[derive(Debug, Clone)]
pub struct TileOutcome {
    pub region: String,
    pub tile: String,
    pub outputs: Vec<DatumOutput>,
    pub elapsed: Duration,
}

impl TileJob {
    fn processed(&self, suffix: &str) -> PathBuf {
        self.processed_dir.join(format!(
            "{}_{}.{}",
            self.tile,
            suffix,
            self.options.format.extension()
        ))
    }

    pub fn tss_conversion_path(&self) -> PathBuf {
        self.processed("tss_conversion")
    }

    pub fn tidal_conversion_path(&self, datum: Datum) -> PathBuf {
        self.processed(&format!("{}_conversion", datum.label()))
    }

    pub fn converted_path(&self, datum: Datum) -> PathBuf {
        self.processed(&format!("lidar_in_{}", datum.label()))
    }

    pub fn hmt_increment_path(&self, datum: Datum) -> PathBuf {
        self.processed(&format!("hmt_incriment_{}", datum.label()))
    }

    pub fn binary_path(&self, datum: Datum) -> PathBuf {
        self.processed(&format!("HMT_binary_via_{}", datum))
    }

    pub fn vector_path(&self, datum: Datum) -> PathBuf {
        tile_vector_path(&self.shp_dir, &self.tile, datum)
    }

    pub fn tile_vector(&self, datum: Datum) -> TileVector {
        TileVector {
            tile: self.tile.clone(),
            path: self.vector_path(datum),
        }
    }

    fn warp_params(&self) -> ReprojectParams {
        ReprojectParams {
            memory_limit_mb: self.memory_limit_mb,
            ..ReprojectParams::with_method(ResampleMethod::Bilinear)
        }
    }

    fn warp_onto_tile(&self, grid: &Path, output: &Path, progress: &Progress) -> Result<PathBuf> {
        reproject_to_template(grid, &self.raw, output, &self.warp_params(), &self.options, progress)
    }
}

/// Run every datum of a tile job in order.
pub fn process_tile(job: &TileJob, progress: &Progress) -> Result<TileOutcome> {
    let start = Instant::now();
    info!(
        "Processing {} tile {} ({:.2} MB)",
        job.region,
        job.tile,
        file_size_mb(&job.raw)
    );
    if !job.raw.exists() {
        return Err(Error::MissingArtifact(job.raw.clone()));
    }
    std::fs::create_dir_all(&job.processed_dir)?;
    std::fs::create_dir_all(&job.shp_dir)?;

    let mut tss_tile: Option<PathBuf> = None;
    let mut outputs = Vec::with_capacity(job.runs.len());

    for run in &job.runs {
        info!("  {} via {}", job.tile, run.datum);

        let elevation = if run.datum.is_tidal() {
            let tidal_grid = run.tidal_grid.as_ref().ok_or_else(|| Error::InvalidParameter {
                name: "tidal_grid",
                value: run.datum.to_string(),
                reason: "tidal datums need an offset grid".into(),
            })?;
            let tss = match &tss_tile {
                Some(path) => path.clone(),
                None => {
                    let path = job.warp_onto_tile(&job.tss_grid, &job.tss_conversion_path(), progress)?;
                    tss_tile = Some(path.clone());
                    path
                }
            };
            let tidal = job.warp_onto_tile(tidal_grid, &job.tidal_conversion_path(run.datum), progress)?;
            convert_to_tidal_datum(
                &job.raw,
                &tss,
                &tidal,
                &job.converted_path(run.datum),
                &job.options,
                progress,
            )?
        } else {
            job.raw.clone()
        };

        let threshold = match &run.hmt {
            HmtThreshold::Scalar(value) => HmtThreshold::Scalar(*value),
            HmtThreshold::Gridded(grid) => HmtThreshold::Gridded(job.warp_onto_tile(
                grid,
                &job.hmt_increment_path(run.datum),
                progress,
            )?),
        };

        let binary = classify_below_hmt(
            &elevation,
            &threshold,
            &job.binary_path(run.datum),
            &job.options,
            progress,
        )?;
        let vector = job.vector_path(run.datum);
        let features = binary_raster_to_vector(&binary, &vector, progress)?;

        if !job.keep_binary {
            debug!("  removing {}", binary.display());
            delete_raster(job.options.format, &binary)?;
        }

        outputs.push(DatumOutput {
            datum: run.datum,
            vector,
            features,
        });
    }

    let elapsed = start.elapsed();
    info!("Finished tile {} in {:.1}s", job.tile, elapsed.as_secs_f64());
    Ok(TileOutcome {
        region: job.region.clone(),
        tile: job.tile.clone(),
        outputs,
        elapsed,
    })
}
