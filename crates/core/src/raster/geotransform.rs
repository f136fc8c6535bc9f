//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and world coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// LIDAR tiles and tidal grids are north-up, so the rotation terms are
/// carried through but ignored by the truncating conversions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// World coordinates to integer pixel indices.
    ///
    /// Truncates toward zero, never rounds, and does no bounds checking: a
    /// point left of or above the origin yields a negative index.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let col = ((x - self.origin_x) / self.pixel_width).trunc();
        let row = ((y - self.origin_y) / self.pixel_height).trunc();
        (col as i64, row as i64)
    }

    /// World coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_world(&self, col: i64, row: i64) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width;
        let y = self.origin_y + row as f64 * self.pixel_height;
        (x, y)
    }

    /// Get the cell size (assumes square pixels and no rotation)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a north-up raster of the given size
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_world(0, 0);
        let (x1, y1) = self.pixel_to_world(width as i64, height as i64);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Transform of a window starting at pixel (col, row); pixel sizes are kept per axis
    pub fn window(&self, col: i64, row: i64) -> Self {
        let (x, y) = self.pixel_to_world(col, row);
        Self {
            origin_x: x,
            origin_y: y,
            ..*self
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_pixel_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 3.0, -3.0);

        for &(col, row) in &[(0, 0), (5, 10), (599, 1), (1199, 1199)] {
            let (x, y) = gt.pixel_to_world(col, row);
            assert_eq!(gt.world_to_pixel(x, y), (col, row));
        }
    }

    #[test]
    fn test_world_pixel_roundtrip_fractional_cells() {
        let gt = GeoTransform::new(1234.567, 98765.4321, 0.1, -0.1);

        for &(col, row) in &[(0, 0), (3, 7), (10, 10), (599, 1), (1199, 1199), (12345, 333)] {
            let (x, y) = gt.pixel_to_world(col, row);

            // The corner itself may land a hair short of the cell edge
            let (c, r) = gt.world_to_pixel(x, y);
            assert!(c == col || c == col - 1, "col {} -> {}", col, c);
            assert!(r == row || r == row - 1, "row {} -> {}", row, r);

            // Anywhere inside the cell maps back exactly
            assert_eq!(gt.world_to_pixel(x + 0.025, y - 0.025), (col, row));
            assert_eq!(gt.world_to_pixel(x + 0.075, y - 0.075), (col, row));
        }
    }

    #[test]
    fn test_world_to_pixel_truncates() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);

        // 2.99 columns right, 0.5 rows down: truncation, not rounding
        assert_eq!(gt.world_to_pixel(2.99, 99.5), (2, 0));
        // Left of the origin truncates toward zero
        assert_eq!(gt.world_to_pixel(-0.5, 100.5), (0, 0));
        assert_eq!(gt.world_to_pixel(-1.5, 101.5), (-1, -1));
    }

    #[test]
    fn test_pixel_to_world_is_corner() {
        let gt = GeoTransform::new(1000.0, 5000.0, 3.0, -3.0);
        let (x, y) = gt.pixel_to_world(2, 4);
        assert_relative_eq!(x, 1006.0, epsilon = 1e-10);
        assert_relative_eq!(y, 4988.0, epsilon = 1e-10);
    }

    #[test]
    fn test_gdal_array_roundtrip() {
        let coeffs = [10.0, 2.0, 0.0, 20.0, 0.0, -2.0];
        assert_eq!(GeoTransform::from_gdal(coeffs).to_gdal(), coeffs);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_window_transform() {
        let gt = GeoTransform::new(0.0, 100.0, 3.0, -2.0);
        let w = gt.window(10, 5);
        assert_relative_eq!(w.origin_x, 30.0);
        assert_relative_eq!(w.origin_y, 90.0);
        assert_relative_eq!(w.pixel_width, 3.0);
        assert_relative_eq!(w.pixel_height, -2.0);
    }
}
