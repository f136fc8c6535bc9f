//! Coordinate Reference System handling

use crate::error::Result;
use gdal::spatial_ref::SpatialRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// NAD83(HARN) / Oregon GIC Lambert (international feet).
///
/// Every LIDAR tile, tidal grid and output vector of the pipeline lives in this CRS.
pub const OREGON_LAMBERT_EPSG: u32 = 2992;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation as stored in a dataset
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// CRS of a dataset projection string; `None` when the dataset carries none.
    pub fn from_projection(projection: &str) -> Option<Self> {
        if projection.trim().is_empty() {
            None
        } else {
            Some(Self::from_wkt(projection))
        }
    }

    /// The pipeline's fixed CRS (EPSG:2992)
    pub fn oregon_lambert() -> Self {
        Self::from_epsg(OREGON_LAMBERT_EPSG)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation as stored
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Build a GDAL spatial reference, preferring the EPSG code
    pub fn to_spatial_ref(&self) -> Result<SpatialRef> {
        let srs = match (self.epsg, &self.wkt) {
            (Some(code), _) => SpatialRef::from_epsg(code)?,
            (None, Some(wkt)) => SpatialRef::from_wkt(wkt)?,
            (None, None) => SpatialRef::from_epsg(OREGON_LAMBERT_EPSG)?,
        };
        Ok(srs)
    }

    /// WKT suitable for handing to GDAL warping routines
    pub fn to_wkt(&self) -> Result<String> {
        match (&self.wkt, self.epsg) {
            (Some(wkt), _) => Ok(wkt.clone()),
            _ => Ok(self.to_spatial_ref()?.to_wkt()?),
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::oregon_lambert()
    }
}
