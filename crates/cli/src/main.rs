//! tidemark CLI - HMT inundation mapping over LIDAR tiles

mod config;
mod driver;
mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use config::Config;
use tidemark_algorithms::algebra::{classify_below_hmt, convert_to_tidal_datum, BlockProcessor, HmtThreshold};
use tidemark_algorithms::fill::{fill_nodata, FillParams};
use tidemark_algorithms::nodata::{create_nodata_mask, fix_nodata};
use tidemark_algorithms::polygonize::binary_raster_to_vector;
use tidemark_algorithms::reproject::{
    reproject_to_template, reproject_window, reproject_window_offset, ReprojectParams, ResampleMethod,
    WindowBounds,
};
use tidemark_core::io::{file_size_mb, OutputFormat, Progress, SourceRaster};
use tidemark_core::BlockSize;
use tidemark_parallel::ExecutionMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about = "Map ground below the Highest Measured Tide from LIDAR tiles", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    /// YAML configuration overriding the built-in defaults
    #[arg(short, long, global = true, env = "TIDEMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Output raster format: hfa, gtiff
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Block size in cells (square)
    #[arg(long, global = true)]
    block_size: Option<usize>,

    /// Threads for the block kernels
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Log file (default from config)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tile chain for configured regions
    Process {
        /// Region name (all regions when omitted)
        #[arg(short, long)]
        region: Option<String>,
        /// Only the first tile of each region
        #[arg(long)]
        small: bool,
        /// Run tiles on a worker pool (0 = one worker per core)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Keep the intermediate binary rasters
        #[arg(long)]
        keep_binary: bool,
    },
    /// Dissolve tile polygons per region and write the area report
    Tabulate {
        /// Region name (all regions when omitted)
        #[arg(short, long)]
        region: Option<String>,
        /// Only the first tile of each region
        #[arg(long)]
        small: bool,
        /// Simplification tolerance in ground units
        #[arg(short, long)]
        tolerance: Option<f64>,
        /// Report CSV path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Mask and fill the merged VDatum grids
    PrepareGrids {
        /// Fill search radius in pixels (0 = whole raster)
        #[arg(long, default_value = "0")]
        max_distance: f64,
        /// Smoothing passes after the fill
        #[arg(long, default_value = "0")]
        smoothing: u32,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Copy a raster with an explicit nodata value
    FixNodata {
        input: PathBuf,
        output: PathBuf,
        /// Nodata value of the output
        #[arg(short, long, default_value = "-9999", allow_hyphen_values = true)]
        nodata: f64,
    },
    /// Byte mask: 1 where the input has data, 0 elsewhere
    Mask { input: PathBuf, output: PathBuf },
    /// Fill nodata by inverse-distance weighting, guided by a mask
    Fill {
        input: PathBuf,
        mask: PathBuf,
        output: PathBuf,
        /// Search radius in pixels (0 = whole raster)
        #[arg(long, default_value = "0")]
        max_distance: f64,
        /// Smoothing passes after the fill
        #[arg(long, default_value = "0")]
        smoothing: u32,
        /// Nodata value of the output
        #[arg(long, default_value = "-9999", allow_hyphen_values = true)]
        nodata: f64,
    },
    /// Reproject/resample onto a template grid or over a window
    Reproject {
        input: PathBuf,
        output: PathBuf,
        /// Snap onto this raster's extent, cell size and size
        #[arg(short, long, conflicts_with_all = ["window", "origin"])]
        template: Option<PathBuf>,
        /// Window corners as min_x,max_x,min_y,max_y
        #[arg(long, allow_hyphen_values = true, conflicts_with = "origin")]
        window: Option<String>,
        /// Window top-left corner as x,y (with --size)
        #[arg(long, allow_hyphen_values = true, requires = "size")]
        origin: Option<String>,
        /// Window size as cols,rows (with --origin)
        #[arg(long)]
        size: Option<String>,
        /// Output cell size for window extraction
        #[arg(long)]
        cell_size: Option<f64>,
        /// Resampling: nearest, bilinear, cubic, cubicspline, lanczos, average
        #[arg(short, long, default_value = "nearest")]
        method: String,
        /// Override the source CRS
        #[arg(long)]
        source_epsg: Option<u32>,
        /// Override the destination CRS
        #[arg(long)]
        target_epsg: Option<u32>,
        /// Warp memory limit in MB
        #[arg(long, default_value = "500")]
        memory_limit: f64,
    },
    /// Convert NAVD88 elevations into a tidal datum
    ConvertDatum {
        elevation: PathBuf,
        /// Topography-of-the-sea-surface grid on the same cell grid (metres)
        tss: PathBuf,
        /// Tidal offset grid on the same cell grid (metres)
        tidal: PathBuf,
        output: PathBuf,
    },
    /// Binary raster of cells at or below the HMT
    Threshold {
        input: PathBuf,
        output: PathBuf,
        /// Scalar HMT
        #[arg(long, allow_hyphen_values = true, required_unless_present = "hmt_grid")]
        hmt: Option<f64>,
        /// Gridded HMT on the input's cell grid
        #[arg(long, conflicts_with = "hmt")]
        hmt_grid: Option<PathBuf>,
    },
    /// Polygonize a binary raster into a shapefile
    Polygonize { input: PathBuf, output: PathBuf },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn progress(quiet: bool, msg: &str) -> Progress {
    if quiet {
        Progress::hidden()
    } else {
        Progress::spinner(msg)
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_floats(s: &str, n: usize, what: &str) -> Result<Vec<f64>> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().with_context(|| format!("Invalid number in {}: {}", what, v)))
        .collect::<Result<Vec<_>>>()?;
    if values.len() != n {
        bail!("{} must have {} comma-separated values, got: {}", what, n, s);
    }
    Ok(values)
}

fn parse_size(s: &str) -> Result<(usize, usize)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("Size must be 'cols,rows', got: {}", s);
    }
    let cols: usize = parts[0].trim().parse().context("Invalid cols")?;
    let rows: usize = parts[1].trim().parse().context("Invalid rows")?;
    Ok((cols, rows))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(format) = cli.format {
        config.raster.format = format;
    }
    if let Some(size) = cli.block_size {
        config.raster.block = BlockSize::square(size)?;
    }
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = log_file.clone();
    }
    config.validate()?;
    Ok(config)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    logging::init(cli.verbose, &config.log_file)?;
    gdal::config::set_config_option("HFA_USE_RRD", "YES").context("Failed to configure GDAL")?;
    if let Some(threads) = config.threads {
        if tidemark_parallel::set_num_threads(threads) {
            info!("Block kernels on {} threads", threads);
        } else {
            warn!("Kernel thread pool already running; ignoring threads = {}", threads);
        }
    }

    let quiet = cli.quiet;
    let options = config.raster;

    match cli.command {
        // ── Pipeline ─────────────────────────────────────────────────
        Commands::Process {
            region,
            small,
            workers,
            keep_binary,
        } => {
            config.keep_binary |= keep_binary;
            let regions = config.select_regions(region.as_deref())?;
            let mode = ExecutionMode::from_workers(workers);
            let start = Instant::now();
            let summary = driver::process_regions(&config, &regions, small, mode, quiet);
            info!(
                "{} tiles done, {} failed, in {:.2?}",
                summary.completed.len(),
                summary.failed.len(),
                start.elapsed()
            );
            if !summary.is_success() {
                for failure in &summary.failed {
                    eprintln!("  {} / {}: {}", failure.region, failure.tile, failure.error);
                }
                bail!("{} tile(s) failed", summary.failed.len());
            }
        }

        Commands::Tabulate {
            region,
            small,
            tolerance,
            csv,
        } => {
            if let Some(tolerance) = tolerance {
                config.aggregate.tolerance = tolerance;
            }
            if let Some(csv) = csv {
                config.report = csv;
            }
            config.validate()?;
            let regions = config.select_regions(region.as_deref())?;
            let start = Instant::now();
            let areas = driver::tabulate(&config, &regions, small, &config.aggregate)?;
            for area in &areas {
                println!("{} via {}: {:.1} sq ft", area.region, area.datum, area.area);
            }
            done("Area report", &config.report, start.elapsed());
        }

        Commands::PrepareGrids {
            max_distance,
            smoothing,
        } => {
            let params = FillParams {
                max_distance,
                smoothing_iterations: smoothing,
                ..Default::default()
            };
            let pb = progress(quiet, "Preparing grids...");
            let start = Instant::now();
            let filled = driver::prepare_grids(&config, &params, &pb)?;
            pb.finish("done");
            for path in &filled {
                println!("Filled grid: {}", path.display());
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let src = SourceRaster::open(&input).context("Failed to open raster")?;
            let spec = src.spec();
            let (min_x, min_y, max_x, max_y) = spec.transform.bounds(spec.cols, spec.rows);

            println!("File: {}", input.display());
            println!("Size: {:.2} MB", file_size_mb(&input));
            println!("Dimensions: {} x {} ({} cells)", spec.cols, spec.rows, spec.cols * spec.rows);
            println!("Cell size: {}", spec.transform.cell_size());
            println!("Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})", min_x, min_y, max_x, max_y);
            if let Some(crs) = spec.crs() {
                println!("CRS: {}", crs);
            }
            println!("Band type: {:?}", src.band_type()?);
            if let Some(nodata) = src.nodata() {
                println!("NoData: {}", nodata);
            }
            match src.statistics() {
                Ok(stats) => {
                    println!("\nStatistics:");
                    println!("  Min: {:.4}", stats.min);
                    println!("  Max: {:.4}", stats.max);
                    println!("  Mean: {:.4}", stats.mean);
                    println!("  StdDev: {:.4}", stats.std_dev);
                }
                Err(e) => println!("\nStatistics unavailable: {}", e),
            }
        }

        // ── Single stages ────────────────────────────────────────────
        Commands::FixNodata {
            input,
            output,
            nodata,
        } => {
            let pb = progress(quiet, "Fixing nodata...");
            let start = Instant::now();
            fix_nodata(&input, &output, nodata, &options, &pb).context("Failed to fix nodata")?;
            pb.finish("done");
            done("Raster", &output, start.elapsed());
        }

        Commands::Mask { input, output } => {
            let pb = progress(quiet, "Creating mask...");
            let start = Instant::now();
            create_nodata_mask(&input, &output, &options, &pb).context("Failed to create mask")?;
            pb.finish("done");
            done("Mask", &output, start.elapsed());
        }

        Commands::Fill {
            input,
            mask,
            output,
            max_distance,
            smoothing,
            nodata,
        } => {
            let params = FillParams {
                max_distance,
                smoothing_iterations: smoothing,
                nodata,
            };
            let pb = progress(quiet, "Filling nodata...");
            let start = Instant::now();
            fill_nodata(&input, &mask, &output, &params, &options, &pb).context("Failed to fill nodata")?;
            pb.finish("done");
            done("Filled raster", &output, start.elapsed());
        }

        Commands::Reproject {
            input,
            output,
            template,
            window,
            origin,
            size,
            cell_size,
            method,
            source_epsg,
            target_epsg,
            memory_limit,
        } => {
            let method: ResampleMethod = method.parse()?;
            let params = ReprojectParams {
                method,
                source_epsg,
                target_epsg,
                memory_limit_mb: memory_limit,
            };
            let pb = progress(quiet, "Reprojecting...");
            let start = Instant::now();

            if let Some(template) = template {
                reproject_to_template(&input, &template, &output, &params, &options, &pb)
                    .context("Failed to reproject onto template")?;
            } else {
                let src = SourceRaster::open(&input).context("Failed to open raster")?;
                let cell_size = cell_size.unwrap_or_else(|| src.spec().transform.cell_size());
                let warped = if let Some(window) = window {
                    let c = parse_floats(&window, 4, "window")?;
                    let bounds = WindowBounds::new(c[0], c[1], c[2], c[3]);
                    reproject_window(&src, bounds, cell_size, &params, &pb)?
                } else if let (Some(origin), Some(size)) = (origin, size) {
                    let xy = parse_floats(&origin, 2, "origin")?;
                    let (cols, rows) = parse_size(&size)?;
                    reproject_window_offset(&src, (xy[0], xy[1]), cols, rows, cell_size, &params, &pb)?
                } else {
                    bail!("Reproject needs --template, --window, or --origin with --size");
                };

                let nodata = warped.nodata();
                BlockProcessor::new(options)
                    .run::<f32, _>(&[("window", &warped)], &output, nodata, &pb, |blocks| {
                        Ok(blocks[0].mapv(|v| v as f32))
                    })
                    .context("Failed to write reprojected window")?;
            }
            pb.finish("done");
            done("Reprojected raster", &output, start.elapsed());
        }

        Commands::ConvertDatum {
            elevation,
            tss,
            tidal,
            output,
        } => {
            let pb = progress(quiet, "Converting datum...");
            let start = Instant::now();
            convert_to_tidal_datum(&elevation, &tss, &tidal, &output, &options, &pb)
                .context("Failed to convert datum")?;
            pb.finish("done");
            done("Converted raster", &output, start.elapsed());
        }

        Commands::Threshold {
            input,
            output,
            hmt,
            hmt_grid,
        } => {
            let threshold = match (hmt, hmt_grid) {
                (_, Some(grid)) => HmtThreshold::Gridded(grid),
                (Some(value), None) => HmtThreshold::Scalar(value),
                (None, None) => bail!("Threshold needs --hmt or --hmt-grid"),
            };
            let pb = progress(quiet, "Classifying...");
            let start = Instant::now();
            classify_below_hmt(&input, &threshold, &output, &options, &pb).context("Failed to classify")?;
            pb.finish("done");
            done("Binary raster", &output, start.elapsed());
        }

        Commands::Polygonize { input, output } => {
            let pb = progress(quiet, "Polygonizing...");
            let start = Instant::now();
            let features = binary_raster_to_vector(&input, &output, &pb).context("Failed to polygonize")?;
            pb.finish("done");
            println!("{} polygons", features);
            done("Shapefile", &output, start.elapsed());
        }
    }

    Ok(())
}
