//! Run configuration
//!
//! Directory layout, region table, grid names and datum runs. The built-in
//! defaults describe the Oregon coast project; a YAML file can override any
//! of them.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tidemark_algorithms::aggregate::{AggregateParams, TileVector};
use tidemark_algorithms::algebra::{HmtThreshold, RasterOptions};
use tidemark_algorithms::pipeline::{tile_vector_path, Datum, DatumRun, TileJob};
use tidemark_core::io::OutputFormat;

/// A named set of LIDAR tiles stored under one block directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Directory under `<data_dir>/LIDAR` holding `raw/`, `processed/` and `shp/`
    pub block: String,
    pub tiles: Vec<String>,
}

impl Region {
    fn new(name: &str, block: &str, tiles: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            block: block.to_string(),
            tiles: tiles.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Tiles to process; `small` keeps only the first one
    pub fn selected_tiles(&self, small: bool) -> &[String] {
        if small {
            &self.tiles[..self.tiles.len().min(1)]
        } else {
            &self.tiles
        }
    }
}

/// File names of the prepared grids, relative to their directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridNames {
    pub tss: String,
    pub mhhw: String,
    pub mllw: String,
    /// Under `hmt_incriment/`
    pub hmt_increment: String,
    /// Merged VDatum grids that `prepare-grids` masks and fills
    pub merged: Vec<String>,
}

impl Default for GridNames {
    fn default() -> Self {
        Self {
            tss: "tss_merged_epsg2992_filled_invdist.img".into(),
            mhhw: "mhhw_merged_epsg2992_filled_invdist.img".into(),
            mllw: "mllw_merged_epsg2992_filled_invdist.img".into(),
            hmt_increment: "dlcd_hmt_mhhw_nearest.img".into(),
            merged: vec![
                "mhhw_merged_epsg2992.img".into(),
                "mllw_merged_epsg2992.img".into(),
                "tss_merged_epsg2992.img".into(),
            ],
        }
    }
}

/// One datum to classify every tile in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub datum: Datum,
    /// Fixed HMT in the datum. Without it the datum's published value is
    /// used, and MHHW falls back to the gridded HMT increment.
    #[serde(default)]
    pub scalar_hmt: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of `LIDAR/`, `tidal_datums/` and `hmt_incriment/`
    pub data_dir: PathBuf,
    /// Merged region shapefiles
    pub output_dir: PathBuf,
    /// Area report CSV
    pub report: PathBuf,
    pub log_file: PathBuf,
    pub grids: GridNames,
    pub regions: Vec<Region>,
    pub runs: Vec<RunConfig>,
    pub raster: RasterOptions,
    pub aggregate: AggregateParams,
    /// Warp memory limit in megabytes
    pub memory_limit_mb: f64,
    /// Keep the binary rasters after polygonizing
    pub keep_binary: bool,
    /// Threads for the block kernels; rayon's default when absent
    pub threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            report: PathBuf::from("output/hmt_areas.csv"),
            log_file: PathBuf::from("logs/hmt_processor.log"),
            grids: GridNames::default(),
            regions: vec![
                Region::new(
                    "SSNERR",
                    "SSNERR_LIDAR",
                    &[
                        "be42124d3", "be43124b2", "be43124c1", "be43124c2", "be43124c3", "be43124d1",
                        "be43124d2",
                    ],
                ),
                Region::new("Nehalem", "Neh_LIDAR", &["be45123f8", "be45123f7", "be45123g7b"]),
                Region::new(
                    "Tillamook",
                    "Till_LIDAR",
                    &["be45123e8", "be45123e7", "be45123d8", "be45123d7", "be45123d6"],
                ),
            ],
            runs: vec![RunConfig {
                datum: Datum::Mhhw,
                scalar_hmt: None,
            }],
            raster: RasterOptions::default(),
            aggregate: AggregateParams::default(),
            memory_limit_mb: 500.0,
            keep_binary: false,
            threads: None,
        }
    }
}

impl Config {
    /// Built-in defaults, or the YAML file at `path` layered over them
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_yaml(&text).with_context(|| format!("Invalid config file: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse YAML")
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            bail!("No regions configured");
        }
        for region in &self.regions {
            if region.tiles.is_empty() {
                bail!("Region {} has no tiles", region.name);
            }
        }
        if self.runs.is_empty() {
            bail!("No datum runs configured");
        }
        if self.raster.format == OutputFormat::Mem {
            bail!("Output format MEM cannot be written to disk");
        }
        if !(self.memory_limit_mb > 0.0) {
            bail!("memory_limit_mb must be positive, got {}", self.memory_limit_mb);
        }
        if self.threads == Some(0) {
            bail!("threads must be at least 1");
        }
        if !(self.aggregate.tolerance >= 0.0) {
            bail!("Simplification tolerance must be zero or positive, got {}", self.aggregate.tolerance);
        }
        Ok(())
    }

    pub fn lidar_dir(&self) -> PathBuf {
        self.data_dir.join("LIDAR")
    }

    pub fn tidal_dir(&self) -> PathBuf {
        self.data_dir.join("tidal_datums")
    }

    pub fn hmt_dir(&self) -> PathBuf {
        self.data_dir.join("hmt_incriment")
    }

    fn block_dir(&self, region: &Region) -> PathBuf {
        self.lidar_dir().join(&region.block)
    }

    fn shp_dir(&self, region: &Region) -> PathBuf {
        self.block_dir(region).join("shp")
    }

    /// Regions to run: the named one, or all of them
    pub fn select_regions(&self, name: Option<&str>) -> Result<Vec<&Region>> {
        match name {
            None => Ok(self.regions.iter().collect()),
            Some(name) => {
                let region = self
                    .regions
                    .iter()
                    .find(|r| r.name.eq_ignore_ascii_case(name))
                    .with_context(|| {
                        let known: Vec<_> = self.regions.iter().map(|r| r.name.as_str()).collect();
                        format!("Unknown region: {}. Known regions: {}", name, known.join(", "))
                    })?;
                Ok(vec![region])
            }
        }
    }

    /// Datums named by the run list, in order
    pub fn datums(&self) -> Vec<Datum> {
        self.runs.iter().map(|r| r.datum).collect()
    }

    fn tidal_grid(&self, datum: Datum) -> Option<PathBuf> {
        match datum {
            Datum::Mhhw => Some(self.tidal_dir().join(&self.grids.mhhw)),
            Datum::Mllw => Some(self.tidal_dir().join(&self.grids.mllw)),
            Datum::Navd88 => None,
        }
    }

    pub fn datum_runs(&self) -> Vec<DatumRun> {
        self.runs
            .iter()
            .map(|run| {
                let hmt = match run.scalar_hmt.or_else(|| run.datum.scalar_hmt()) {
                    Some(value) => HmtThreshold::Scalar(value),
                    None => HmtThreshold::Gridded(self.hmt_dir().join(&self.grids.hmt_increment)),
                };
                DatumRun {
                    datum: run.datum,
                    tidal_grid: self.tidal_grid(run.datum),
                    hmt,
                }
            })
            .collect()
    }

    pub fn tile_job(&self, region: &Region, tile: &str) -> TileJob {
        let block_dir = self.block_dir(region);
        TileJob {
            region: region.name.clone(),
            tile: tile.to_string(),
            raw: block_dir.join("raw").join(tile),
            processed_dir: block_dir.join("processed"),
            shp_dir: self.shp_dir(region),
            tss_grid: self.tidal_dir().join(&self.grids.tss),
            runs: self.datum_runs(),
            options: self.raster,
            memory_limit_mb: self.memory_limit_mb,
            keep_binary: self.keep_binary,
        }
    }

    /// Per-tile shapefiles of a region for one datum
    pub fn tile_vectors(&self, region: &Region, datum: Datum, small: bool) -> Vec<TileVector> {
        let shp_dir = self.shp_dir(region);
        region
            .selected_tiles(small)
            .iter()
            .map(|tile| TileVector {
                tile: tile.clone(),
                path: tile_vector_path(&shp_dir, tile, datum),
            })
            .collect()
    }

    /// `<stem><suffix>.<ext>` next to a merged grid, with the output format's extension
    pub fn derived_grid(&self, merged: &str, suffix: &str) -> PathBuf {
        let stem = Path::new(merged)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| merged.to_string());
        self.tidal_dir()
            .join(format!("{}{}.{}", stem, suffix, self.raster.format.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::BlockSize;

    #[test]
    fn test_default_table() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.regions.len(), 3);
        assert_eq!(config.regions[0].tiles.len(), 7);
        assert_eq!(config.regions[1].block, "Neh_LIDAR");
        assert_eq!(config.datums(), vec![Datum::Mhhw]);
    }

    #[test]
    fn test_small_keeps_first_tile() {
        let config = Config::default();
        let region = &config.regions[2];
        assert_eq!(region.selected_tiles(true), &["be45123e8".to_string()]);
        assert_eq!(region.selected_tiles(false).len(), 5);
    }

    #[test]
    fn test_select_regions() {
        let config = Config::default();
        assert_eq!(config.select_regions(None).unwrap().len(), 3);
        let nehalem = config.select_regions(Some("nehalem")).unwrap();
        assert_eq!(nehalem[0].name, "Nehalem");
        assert!(config.select_regions(Some("Coos")).is_err());
    }

    #[test]
    fn test_tile_job_layout() {
        let config = Config::default();
        let job = config.tile_job(&config.regions[1], "be45123f8");
        assert_eq!(job.raw, PathBuf::from("data/LIDAR/Neh_LIDAR/raw/be45123f8"));
        assert_eq!(job.processed_dir, PathBuf::from("data/LIDAR/Neh_LIDAR/processed"));
        assert_eq!(
            job.tss_grid,
            PathBuf::from("data/tidal_datums/tss_merged_epsg2992_filled_invdist.img")
        );
        assert_eq!(job.runs.len(), 1);
        assert_eq!(
            job.runs[0].hmt,
            HmtThreshold::Gridded(PathBuf::from("data/hmt_incriment/dlcd_hmt_mhhw_nearest.img"))
        );
        assert_eq!(
            job.runs[0].tidal_grid,
            Some(PathBuf::from("data/tidal_datums/mhhw_merged_epsg2992_filled_invdist.img"))
        );
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
data_dir: /srv/hmt
runs:
  - datum: MLLW
  - datum: NAVD88
    scalar_hmt: 12.0
raster:
  format: gtiff
  block:
    cols: 256
    rows: 128
aggregate:
  tolerance: 0.5
threads: 4
regions:
  - name: Test
    block: Test_LIDAR
    tiles: [a1, a2]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/hmt"));
        assert_eq!(config.raster.format, OutputFormat::GTiff);
        assert_eq!(config.raster.block, BlockSize::new(256, 128).unwrap());
        assert_eq!(config.aggregate.tolerance, 0.5);
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.aggregate.epsg, 2992);
        assert_eq!(config.memory_limit_mb, 500.0);

        let runs = config.datum_runs();
        assert_eq!(runs[0].hmt, HmtThreshold::Scalar(11.62));
        assert!(runs[0].tidal_grid.is_some());
        assert_eq!(runs[1].hmt, HmtThreshold::Scalar(12.0));
        assert_eq!(runs[1].tidal_grid, None);

        let vectors = config.tile_vectors(&config.regions[0], Datum::Navd88, false);
        assert_eq!(vectors[1].path, PathBuf::from("/srv/hmt/LIDAR/Test_LIDAR/shp/a2_belowHMT_viaNAVD88.shp"));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut config = Config::default();
        config.runs.clear();
        assert!(config.validate().is_err());

        let zero_block = "raster:\n  format: hfa\n  block:\n    cols: 0\n    rows: 600\n";
        assert!(Config::from_yaml(zero_block).is_err());
        assert!(Config::from_yaml(&zero_block.replace("cols: 0", "cols: 600")).is_ok());

        let mut config = Config::default();
        config.raster.format = OutputFormat::Mem;
        assert!(config.validate().is_err());

        assert!(Config::from_yaml("regions: 3").is_err());

        let config = Config::from_yaml("threads: 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_grid_names() {
        let config = Config::default();
        assert_eq!(
            config.derived_grid("mhhw_merged_epsg2992.img", "_mask"),
            PathBuf::from("data/tidal_datums/mhhw_merged_epsg2992_mask.img")
        );
        assert_eq!(
            config.derived_grid("tss_merged_epsg2992.img", "_filled_invdist"),
            PathBuf::from("data/tidal_datums/tss_merged_epsg2992_filled_invdist.img")
        );
    }
}
