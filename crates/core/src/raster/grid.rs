//! Grid specification and the co-registration precondition

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Cell grid of a raster: size, georeferencing and projection.
///
/// Two rasters with equal size and geotransform can be combined block by
/// block without any re-registration.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub cols: usize,
    pub rows: usize,
    pub transform: GeoTransform,
    /// Projection WKT as stored in the dataset (may be empty)
    pub projection: String,
}

impl GridSpec {
    pub fn new(cols: usize, rows: usize, transform: GeoTransform, projection: impl Into<String>) -> Self {
        Self {
            cols,
            rows,
            transform,
            projection: projection.into(),
        }
    }

    pub fn crs(&self) -> Option<CRS> {
        CRS::from_projection(&self.projection)
    }

    /// Same spec with a different size (used for windows)
    pub fn with_size(&self, cols: usize, rows: usize, transform: GeoTransform) -> Self {
        Self {
            cols,
            rows,
            transform,
            projection: self.projection.clone(),
        }
    }

    /// Compare against `other`, returning the first differing property.
    ///
    /// Floating-point properties are compared exactly: grids that will be
    /// combined cell by cell come from the same template.
    pub fn check_same_grid(&self, reference: &str, other_name: &str, other: &GridSpec) -> Result<()> {
        let mismatch = |what: &'static str, expected: String, actual: String| Error::GridMismatch {
            reference: reference.to_string(),
            other: other_name.to_string(),
            what,
            expected,
            actual,
        };

        if self.cols != other.cols {
            return Err(mismatch("column count", self.cols.to_string(), other.cols.to_string()));
        }
        if self.rows != other.rows {
            return Err(mismatch("row count", self.rows.to_string(), other.rows.to_string()));
        }

        let a = &self.transform;
        let b = &other.transform;
        if a.origin_x != b.origin_x || a.origin_y != b.origin_y {
            return Err(mismatch(
                "origin",
                format!("({}, {})", a.origin_x, a.origin_y),
                format!("({}, {})", b.origin_x, b.origin_y),
            ));
        }
        if a.pixel_width != b.pixel_width || a.pixel_height != b.pixel_height {
            return Err(mismatch(
                "pixel size",
                format!("({}, {})", a.pixel_width, a.pixel_height),
                format!("({}, {})", b.pixel_width, b.pixel_height),
            ));
        }
        if a != b {
            return Err(mismatch(
                "geotransform",
                format!("{:?}", a.to_gdal()),
                format!("{:?}", b.to_gdal()),
            ));
        }

        if self.projection != other.projection {
            tracing::warn!(
                "{} and {} carry different projection strings; grids are otherwise identical",
                reference,
                other_name
            );
        }

        Ok(())
    }
}

/// Check that every named grid is identical to the first one.
///
/// Must be called before any output file is created.
pub fn ensure_coregistered(grids: &[(&str, &GridSpec)]) -> Result<()> {
    let Some(((ref_name, reference), rest)) = grids.split_first() else {
        return Ok(());
    };
    for (name, grid) in rest {
        reference.check_same_grid(ref_name, name, grid)?;
    }
    Ok(())
}
