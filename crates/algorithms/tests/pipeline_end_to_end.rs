//! End-to-end runs of the HMT chain on synthetic rasters.
//!
//! Every raster is written as GeoTIFF into a scratch directory, in
//! EPSG:2992 with 3 ft cells for the tiles and 30 ft cells for the tidal
//! correction grids.

use approx::assert_relative_eq;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tidemark_algorithms::aggregate::{aggregate_region, AggregateParams, AreaReport, REPORT_HEADER};
use tidemark_algorithms::algebra::{
    classify_below_hmt, convert_to_tidal_datum, HmtThreshold, RasterOptions, SURVEY_FEET_PER_METER,
};
use tidemark_algorithms::pipeline::{process_tile, Datum, DatumRun, TileJob};
use tidemark_algorithms::polygonize::binary_raster_to_vector;
use tidemark_core::io::{OutputFormat, OutputRaster, Progress, SourceRaster};
use tidemark_core::raster::{BlockSize, BlockWindow, GeoTransform, GridSpec};
use tidemark_core::{Error, CRS};

const ORIGIN_X: f64 = 7_000_000.0;
const ORIGIN_Y: f64 = 700_000.0;

fn oregon_grid(cols: usize, rows: usize, cell: f64) -> GridSpec {
    let wkt = CRS::oregon_lambert().to_wkt().expect("EPSG:2992 should resolve");
    GridSpec::new(cols, rows, GeoTransform::new(ORIGIN_X, ORIGIN_Y, cell, -cell), wkt)
}

fn write<F: Fn(usize, usize) -> f32>(path: &Path, spec: &GridSpec, nodata: Option<f64>, f: F) -> PathBuf {
    let mut out = OutputRaster::<f32>::create(OutputFormat::GTiff, path, spec, nodata).unwrap();
    let block = Array2::from_shape_fn((spec.rows, spec.cols), |(r, c)| f(r, c));
    out.write_block(&BlockWindow::full(spec.cols, spec.rows), &block).unwrap();
    out.finish().unwrap()
}

fn read_all(path: &Path) -> Array2<f64> {
    let src = SourceRaster::open(path).unwrap();
    let (cols, rows) = (src.spec().cols, src.spec().rows);
    src.read_block(&BlockWindow::full(cols, rows)).unwrap()
}

fn options() -> RasterOptions {
    RasterOptions {
        format: OutputFormat::GTiff,
        block: BlockSize::default(),
    }
}

// ---------------------------------------------------------------------------
// Datum conversion over four 600x600 blocks
// ---------------------------------------------------------------------------

#[test]
fn conversion_and_threshold_on_1200_square_tile() {
    let dir = TempDir::new().unwrap();
    let spec = oregon_grid(1200, 1200, 3.0);
    let elevation = |r: usize, c: usize| 5.0 + ((r * 7 + c * 13) % 50) as f32 * 0.1;

    let lidar = write(&dir.path().join("lidar.tif"), &spec, Some(-9999.0), |r, c| {
        if r == 1199 && c == 1199 {
            -9999.0
        } else {
            elevation(r, c)
        }
    });
    let tss = write(&dir.path().join("tss.tif"), &spec, None, |_, _| 1.0);
    let tidal = write(&dir.path().join("tidal.tif"), &spec, None, |_, _| 0.5);

    let converted = convert_to_tidal_datum(
        &lidar,
        &tss,
        &tidal,
        &dir.path().join("lidar_in_mhhw.tif"),
        &options(),
        &Progress::hidden(),
    )
    .unwrap();

    let data = read_all(&converted);
    assert_eq!(data.dim(), (1200, 1200));
    for &(r, c) in &[(0, 0), (599, 599), (600, 600), (0, 1199), (1199, 0), (123, 987)] {
        let expected = elevation(r, c) as f64 + 1.0 * SURVEY_FEET_PER_METER - 0.5 * SURVEY_FEET_PER_METER;
        assert_relative_eq!(data[[r, c]], expected, epsilon = 1e-4);
    }
    assert_eq!(data[[1199, 1199]], -9999.0);
    assert_eq!(SourceRaster::open(&converted).unwrap().nodata(), Some(-9999.0));

    // Threshold below the minimum: nothing classified, nothing polygonized
    let binary = classify_below_hmt(
        &converted,
        &HmtThreshold::Scalar(0.0),
        &dir.path().join("binary.tif"),
        &options(),
        &Progress::hidden(),
    )
    .unwrap();
    assert!(read_all(&binary).iter().all(|&v| v == 0.0));

    let features =
        binary_raster_to_vector(&binary, &dir.path().join("below.shp"), &Progress::hidden()).unwrap();
    assert_eq!(features, 0);
}

#[test]
fn mismatched_grids_leave_no_output() {
    let dir = TempDir::new().unwrap();
    let spec = oregon_grid(64, 64, 3.0);
    let coarse = oregon_grid(64, 64, 1.0);

    let lidar = write(&dir.path().join("lidar.tif"), &spec, Some(-9999.0), |_, _| 4.0);
    let tss = write(&dir.path().join("tss.tif"), &spec, None, |_, _| 1.0);
    let tidal = write(&dir.path().join("tidal.tif"), &coarse, None, |_, _| 0.5);

    let output = dir.path().join("lidar_in_mhhw.tif");
    let err = convert_to_tidal_datum(&lidar, &tss, &tidal, &output, &options(), &Progress::hidden()).unwrap_err();
    assert!(matches!(err, Error::GridMismatch { what: "pixel size", .. }));
    assert!(!output.exists());
}

// ---------------------------------------------------------------------------
// Full tile chain and regional tabulation
// ---------------------------------------------------------------------------

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    tss: PathBuf,
    mhhw: PathBuf,
    hmt: PathBuf,
}

/// Two 60x60 tiles side by side, each with a low-lying west half
fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let raw = root.join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    for (i, name) in ["t1", "t2"].iter().enumerate() {
        let x0 = ORIGIN_X + i as f64 * 300.0;
        let spec = GridSpec::new(
            60,
            60,
            GeoTransform::new(x0, ORIGIN_Y, 3.0, -3.0),
            CRS::oregon_lambert().to_wkt().unwrap(),
        );
        write(&raw.join(format!("{}.tif", name)), &spec, Some(-9999.0), |_, c| {
            if c < 30 {
                2.0
            } else {
                30.0
            }
        });
    }

    let grids = oregon_grid(20, 20, 30.0);
    let tss = write(&root.join("tss.tif"), &grids, Some(-9999.0), |_, _| 0.2);
    let mhhw = write(&root.join("mhhw.tif"), &grids, Some(-9999.0), |_, _| 1.0);
    let hmt = write(&root.join("hmt.tif"), &grids, Some(-9999.0), |_, _| 3.0);

    Fixture {
        _dir: dir,
        root,
        tss,
        mhhw,
        hmt,
    }
}

fn job(fx: &Fixture, tile: &str, runs: Vec<DatumRun>) -> TileJob {
    TileJob {
        region: "Nehalem".into(),
        tile: tile.into(),
        raw: fx.root.join("raw").join(format!("{}.tif", tile)),
        processed_dir: fx.root.join("processed"),
        shp_dir: fx.root.join("shp"),
        tss_grid: fx.tss.clone(),
        runs,
        options: RasterOptions {
            format: OutputFormat::GTiff,
            block: BlockSize::square(25).unwrap(),
        },
        memory_limit_mb: 64.0,
        keep_binary: false,
    }
}

#[test]
fn tile_chain_produces_polygons_and_cleans_up() {
    let fx = fixture();
    let runs = vec![
        DatumRun {
            datum: Datum::Mhhw,
            tidal_grid: Some(fx.mhhw.clone()),
            hmt: HmtThreshold::Gridded(fx.hmt.clone()),
        },
        DatumRun {
            datum: Datum::Navd88,
            tidal_grid: None,
            hmt: HmtThreshold::Scalar(11.23),
        },
    ];
    let job = job(&fx, "t1", runs);
    let outcome = process_tile(&job, &Progress::hidden()).unwrap();

    assert_eq!(outcome.outputs.len(), 2);
    for output in &outcome.outputs {
        assert!(output.vector.exists());
        assert_eq!(output.features, 1, "{}", output.datum);
        assert!(!job.binary_path(output.datum).exists());
    }
    assert!(job.tss_conversion_path().exists());
    assert!(job.converted_path(Datum::Mhhw).exists());
    assert!(job.hmt_increment_path(Datum::Mhhw).exists());
    assert!(!job.converted_path(Datum::Navd88).exists());

    // 2 + 0.2 m * 3.28 - 1.0 m * 3.28 is well below the 3 ft increment
    let converted = read_all(&job.converted_path(Datum::Mhhw));
    assert_relative_eq!(converted[[10, 10]], 2.0 - 0.8 * SURVEY_FEET_PER_METER, epsilon = 1e-4);
}

#[test]
fn tidal_run_without_grid_is_rejected() {
    let fx = fixture();
    let runs = vec![DatumRun {
        datum: Datum::Mllw,
        tidal_grid: None,
        hmt: HmtThreshold::Scalar(11.62),
    }];
    let err = process_tile(&job(&fx, "t1", runs), &Progress::hidden()).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { name: "tidal_grid", .. }));
}

#[test]
fn region_tabulation_dissolves_tiles() {
    let fx = fixture();
    let mut vectors = Vec::new();
    for tile in ["t1", "t2"] {
        let runs = vec![DatumRun {
            datum: Datum::Navd88,
            tidal_grid: None,
            hmt: HmtThreshold::Scalar(11.23),
        }];
        let job = job(&fx, tile, runs);
        process_tile(&job, &Progress::hidden()).unwrap();
        vectors.push(job.tile_vector(Datum::Navd88));
    }

    let output_dir = fx.root.join("output");
    let area = aggregate_region("Nehalem", Datum::Navd88, &vectors, &output_dir, &AggregateParams::default())
        .unwrap();

    // Each tile contributes a 90 ft x 180 ft low strip; the strips do not touch
    assert_eq!(area.tiles, vec!["t1".to_string(), "t2".to_string()]);
    assert_relative_eq!(area.area, 2.0 * 90.0 * 180.0, epsilon = 1e-6);
    assert!(area.output.ends_with("Nehalem_navd88_merged_areas.shp"));

    let csv = fx.root.join("areas.csv");
    let mut report = AreaReport::create(&csv).unwrap();
    report.append(&area).unwrap();
    drop(report);
    let text = std::fs::read_to_string(&csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(REPORT_HEADER));
    assert_eq!(lines.next(), Some("Nehalem,t1;t2,NAVD88,32400"));
}
