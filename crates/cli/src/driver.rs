//! Region-level orchestration: tile jobs, tabulation and grid preparation

use crate::config::{Config, Region};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tidemark_algorithms::aggregate::{aggregate_region, AggregateParams, AreaReport, RegionArea};
use tidemark_algorithms::fill::{fill_nodata, FillParams};
use tidemark_algorithms::nodata::create_nodata_mask;
use tidemark_algorithms::pipeline::{process_tile, TileJob, TileOutcome};
use tidemark_core::io::Progress;
use tidemark_parallel::{ExecutionMode, PoolReport};
use tracing::{error, info};

/// A tile whose chain stopped with an error
#[derive(Debug, Clone)]
pub struct TileFailure {
    pub region: String,
    pub tile: String,
    pub error: String,
}

/// What a `process` run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<TileOutcome>,
    pub failed: Vec<TileFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build one job per selected tile, region by region
pub fn tile_jobs(config: &Config, regions: &[&Region], small: bool) -> Vec<TileJob> {
    regions
        .iter()
        .flat_map(|region| {
            region
                .selected_tiles(small)
                .iter()
                .map(|tile| config.tile_job(region, tile))
        })
        .collect()
}

/// Progress for the tile chain. Concurrent bars would interleave, so only a
/// sequential, non-quiet run gets a visible one.
pub fn tile_progress(mode: ExecutionMode, quiet: bool) -> Progress {
    if mode.is_sequential() && !quiet {
        Progress::bar(0, "tile")
    } else {
        Progress::hidden()
    }
}

/// Run the tile chain over every selected tile.
///
/// Each tile is independent: a failure is recorded and the other tiles still
/// run. In pool mode the call returns only after every worker has exited.
pub fn process_regions(
    config: &Config,
    regions: &[&Region],
    small: bool,
    mode: ExecutionMode,
    quiet: bool,
) -> RunSummary {
    let jobs = tile_jobs(config, regions, small);
    info!(
        "Processing {} tiles in {} region(s), {}",
        jobs.len(),
        regions.len(),
        if mode.is_sequential() {
            "sequentially".to_string()
        } else {
            format!("on {} workers", mode.worker_count())
        }
    );

    let progress = tile_progress(mode, quiet);

    let report = mode.run(jobs, |job| {
        let result = process_tile(&job, &progress);
        (job.region, job.tile, result)
    });
    progress.finish("done");

    if !mode.is_sequential() {
        log_worker_stats(&report);
    }

    let mut summary = RunSummary::default();
    for job in report.results {
        let (region, tile, result) = job.result;
        match result {
            Ok(outcome) => {
                info!("{} tile {} finished in {:.2?}", region, tile, outcome.elapsed);
                summary.completed.push(outcome);
            }
            Err(e) => {
                error!("{} tile {} failed: {}", region, tile, e);
                summary.failed.push(TileFailure {
                    region,
                    tile,
                    error: e.to_string(),
                });
            }
        }
    }
    summary
}

fn log_worker_stats<R>(report: &PoolReport<R>) {
    info!(
        "{} jobs on {} workers in {:.2?}",
        report.total_jobs(),
        report.stats.len(),
        report.wall_time
    );
    for stats in &report.stats {
        info!(
            "  worker {}: {} jobs, busy {:.2?}",
            stats.worker, stats.jobs, stats.busy
        );
    }
}

/// Dissolve every region's tile polygons per configured datum and write the area report.
pub fn tabulate(config: &Config, regions: &[&Region], small: bool, params: &AggregateParams) -> Result<Vec<RegionArea>> {
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", config.output_dir.display()))?;
    let mut report = AreaReport::create(&config.report)
        .with_context(|| format!("Failed to create report: {}", config.report.display()))?;

    let mut areas = Vec::new();
    for region in regions {
        for datum in config.datums() {
            let tiles = config.tile_vectors(region, datum, small);
            let area = aggregate_region(&region.name, datum, &tiles, &config.output_dir, params)
                .with_context(|| format!("Failed to tabulate {} via {}", region.name, datum))?;
            report.append(&area)?;
            areas.push(area);
        }
    }
    info!("Area report written to {}", config.report.display());
    Ok(areas)
}

/// Mask then fill each merged VDatum grid; returns the filled grids.
pub fn prepare_grids(config: &Config, params: &FillParams, progress: &Progress) -> Result<Vec<PathBuf>> {
    let mut masks = Vec::with_capacity(config.grids.merged.len());
    for name in &config.grids.merged {
        let input = config.tidal_dir().join(name);
        let mask = config.derived_grid(name, "_mask");
        create_nodata_mask(&input, &mask, &config.raster, progress)
            .with_context(|| format!("Failed to mask {}", input.display()))?;
        masks.push((input, mask));
    }

    let mut filled = Vec::with_capacity(masks.len());
    for ((input, mask), name) in masks.into_iter().zip(&config.grids.merged) {
        let output = config.derived_grid(name, "_filled_invdist");
        let path = fill_nodata(&input, &mask, &output, params, &config.raster, progress)
            .with_context(|| format!("Failed to fill {}", input.display()))?;
        filled.push(path);
    }
    Ok(filled)
}
