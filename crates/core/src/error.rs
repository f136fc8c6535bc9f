//! Error types for tidemark

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tidemark operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Two rasters that must share one cell grid do not.
    #[error("Grid mismatch between {reference} and {other}: {what} differs ({expected} vs {actual})")]
    GridMismatch {
        reference: String,
        other: String,
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error(
        "Window at pixel ({col}, {row}) of size {cols}x{rows} lies outside raster of size {raster_cols}x{raster_rows}"
    )]
    WindowOutOfBounds {
        col: i64,
        row: i64,
        cols: i64,
        rows: i64,
        raster_cols: usize,
        raster_rows: usize,
    },

    #[error("Expected artifact not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("Raster has no band {0}")]
    MissingBand(usize),

    #[error("GDAL error: {0}")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::Other(format!("array shape error: {}", e))
    }
}

/// Result type alias for tidemark operations
pub type Result<T> = std::result::Result<T, Error>;
