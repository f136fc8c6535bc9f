//! Region-level dissolve of per-tile HMT polygons and area reporting

use crate::pipeline::Datum;
use gdal::vector::{FieldDefn, FieldValue, Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tidemark_core::io::{create_shapefile, open_vector};
use tidemark_core::{Error, Result, CRS};
use tracing::{error, info};

/// Attribute written on every merged feature
pub const BELOW_HMT_FIELD: &str = "belowHMT";

/// Header of the area report
pub const REPORT_HEADER: &str = "block_name,quad,datum,area_under_HMT_sqft";

/// Parameters of [`aggregate_region`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateParams {
    /// Simplification tolerance in ground units
    pub tolerance: f64,
    /// CRS of the merged output
    pub epsg: u32,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            tolerance: 2.0,
            epsg: tidemark_core::crs::OREGON_LAMBERT_EPSG,
        }
    }
}

/// One tile's polygon layer
#[derive(Debug, Clone, PartialEq)]
pub struct TileVector {
    pub tile: String,
    pub path: PathBuf,
}

/// Dissolved HMT area of one region in one datum
#[derive(Debug, Clone, PartialEq)]
pub struct RegionArea {
    pub region: String,
    pub datum: Datum,
    /// Tiles whose polygons were merged, in processing order
    pub tiles: Vec<String>,
    /// Sum of simplified polygon areas per tile (overlaps counted twice)
    pub tile_areas: Vec<(String, f64)>,
    /// Area of the dissolved geometry
    pub area: f64,
    pub output: PathBuf,
}

/// Output shapefile path for a region and datum
pub fn merged_output_path(output_dir: &Path, region: &str, datum: Datum) -> PathBuf {
    output_dir.join(format!("{}_{}_merged_areas.shp", region, datum.label()))
}

/// Union of a set of polygons.
///
/// Overlapping parts are counted once in the result's area.
pub fn dissolve(geometries: Vec<Geometry>) -> Result<Geometry> {
    let mut collection = Geometry::empty(OGRwkbGeometryType::wkbGeometryCollection)?;
    for geometry in geometries {
        collection.add_geometry(geometry)?;
    }
    Ok(collection.buffer(0.0, 30)?)
}

fn to_multipolygon(geometry: Geometry) -> Result<Geometry> {
    if geometry.geometry_type() == OGRwkbGeometryType::wkbMultiPolygon {
        return Ok(geometry);
    }
    let mut multi = Geometry::empty(OGRwkbGeometryType::wkbMultiPolygon)?;
    if geometry.geometry_type() == OGRwkbGeometryType::wkbPolygon {
        multi.add_geometry(geometry)?;
    } else {
        for i in 0..geometry.geometry_count() {
            let part = geometry.get_geometry(i);
            if part.geometry_type() == OGRwkbGeometryType::wkbPolygon {
                multi.add_geometry(Geometry::clone(&part))?;
            }
        }
    }
    Ok(multi)
}

/// Simplified geometries of every feature in a tile layer, with their total area
fn read_tile(path: &Path, tolerance: f64) -> Result<(Vec<Geometry>, f64)> {
    let dataset = open_vector(path)?;
    let mut layer = dataset.layer(0)?;
    let mut geometries = Vec::new();
    let mut total = 0.0;
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        let simplified = geometry.simplify(tolerance)?;
        total += simplified.area();
        geometries.push(simplified);
    }
    Ok((geometries, total))
}

/// Merge the polygons of every tile of a region into one dissolved feature.
///
/// Tiles whose shapefile is missing or unreadable are logged and skipped.
/// The output holds a single MultiPolygon feature (none when nothing is
/// below the HMT).
pub fn aggregate_region(
    region: &str,
    datum: Datum,
    tiles: &[TileVector],
    output_dir: &Path,
    params: &AggregateParams,
) -> Result<RegionArea> {
    info!("Tabulating {} via {}", region, datum);
    if !(params.tolerance >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "tolerance",
            value: params.tolerance.to_string(),
            reason: "must be zero or positive".into(),
        });
    }

    let mut merged = Vec::new();
    let mut contributing = Vec::new();
    let mut tile_areas = Vec::new();
    for tile in tiles {
        match read_tile(&tile.path, params.tolerance) {
            Ok((geometries, area)) => {
                info!("  total square feet of HMT area in {}: {}", tile.tile, area);
                merged.extend(geometries);
                contributing.push(tile.tile.clone());
                tile_areas.push((tile.tile.clone(), area));
            }
            Err(Error::MissingArtifact(path)) => {
                error!(
                    "The HMT shapefile (via {}) for {} doesn't exist: {}. Skipping!",
                    datum,
                    tile.tile,
                    path.display()
                );
            }
            Err(e) => {
                error!("Could not read shapefile {}: {}. Skipping!", tile.path.display(), e);
            }
        }
    }

    info!("  Dissolving {} polygons...", merged.len());
    let dissolved = dissolve(merged)?;
    let area = dissolved.area();

    std::fs::create_dir_all(output_dir)?;
    let output = merged_output_path(output_dir, region, datum);
    let srs = CRS::from_epsg(params.epsg).to_spatial_ref()?;
    let mut dataset = create_shapefile(&output)?;
    let mut layer = dataset.create_layer(LayerOptions {
        name: "merged_areas",
        srs: Some(&srs),
        ty: OGRwkbGeometryType::wkbMultiPolygon,
        options: None,
    })?;
    let field = FieldDefn::new(BELOW_HMT_FIELD, OGRFieldType::OFTString)?;
    field.set_width(5);
    field.add_to_layer(&layer)?;

    if area > 0.0 {
        layer.create_feature_fields(
            to_multipolygon(dissolved)?,
            &[BELOW_HMT_FIELD],
            &[FieldValue::StringValue("Yes".to_string())],
        )?;
    }
    info!("  {} {} area under HMT: {} sq ft", region, datum, area);

    Ok(RegionArea {
        region: region.to_string(),
        datum,
        tiles: contributing,
        tile_areas,
        area,
        output,
    })
}

/// CSV area report, one row per region and datum
pub struct AreaReport {
    writer: BufWriter<File>,
}

impl AreaReport {
    /// Create (truncate) the report and write its header
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", REPORT_HEADER)?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, area: &RegionArea) -> Result<()> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            csv_field(&area.region),
            csv_field(&area.tiles.join(";")),
            area.datum,
            area.area
        )?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Quote a field that holds a separator, quote or line break; inner quotes are doubled
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
