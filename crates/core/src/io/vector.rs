//! Shapefile helpers

use crate::error::{Error, Result};
use gdal::{Dataset, DriverManager};
use std::path::Path;
use tracing::debug;

pub const SHAPEFILE_DRIVER: &str = "ESRI Shapefile";

/// Remove a shapefile and its sidecars if present
pub fn delete_vector(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    debug!("Deleting existing vector {}", path.display());
    DriverManager::get_driver_by_name(SHAPEFILE_DRIVER)?.delete(path)?;
    Ok(())
}

/// Create an empty shapefile data source, replacing any existing one
pub fn create_shapefile(path: &Path) -> Result<Dataset> {
    delete_vector(path)?;
    let driver = DriverManager::get_driver_by_name(SHAPEFILE_DRIVER)?;
    Ok(driver.create_vector_only(path)?)
}

/// Open an existing vector data source read-only
pub fn open_vector(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(Error::MissingArtifact(path.to_path_buf()));
    }
    Ok(Dataset::open(path)?)
}
