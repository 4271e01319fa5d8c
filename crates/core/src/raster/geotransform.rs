//! Affine geotransformation for rasters

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// North-up affine transformation for georeferencing rasters.
///
/// Converts between cell indices (col, row) and world coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for north-up grids, so rows grow southwards.
/// Canopy height models are always square-celled; see [`GeoTransform::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X direction
    pub pixel_width: f64,
    /// Cell size in Y direction, usually negative
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// North-up transform with square cells whose upper-left corner is `(min_x, max_y)`
    pub fn from_origin(min_x: f64, max_y: f64, cell_size: f64) -> Self {
        Self::new(min_x, max_y, cell_size, -cell_size)
    }

    /// Create from GDAL-style array [origin_x, pixel_width, 0, origin_y, 0, pixel_height]
    ///
    /// Rotation terms must be zero.
    pub fn from_gdal(coeffs: [f64; 6]) -> Result<Self> {
        if coeffs[2] != 0.0 || coeffs[4] != 0.0 {
            return Err(Error::invalid_parameter(
                "geotransform",
                format!("{:?}", coeffs),
                "rotated grids are not supported",
            ));
        }
        Ok(Self::new(coeffs[0], coeffs[3], coeffs[1], coeffs[5]))
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Convert cell indices to world coordinates of the cell centre
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.fractional_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Convert cell indices to world coordinates of the cell's upper-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.fractional_to_geo(col as f64, row as f64)
    }

    /// Convert fractional cell coordinates to world coordinates
    pub fn fractional_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Convert world coordinates to fractional cell coordinates (col, row)
    ///
    /// Use `.floor()` to get integer indices. Degenerate transforms yield NaN.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Cell size (side length of a square cell)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Area covered by one cell
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Check if this is a north-up grid
    pub fn is_north_up(&self) -> bool {
        self.pixel_width > 0.0 && self.pixel_height < 0.0
    }

    /// Reject transforms that cannot describe a uniform grid of positive square cells
    pub fn validate(&self) -> Result<()> {
        let coeffs = [self.origin_x, self.origin_y, self.pixel_width, self.pixel_height];
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(Error::invalid_parameter(
                "geotransform",
                format!("{:?}", coeffs),
                "coefficients must be finite",
            ));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(Error::invalid_parameter(
                "cell_size",
                format!("{} x {}", self.pixel_width, self.pixel_height),
                "cell size must be > 0",
            ));
        }
        let (w, h) = (self.pixel_width.abs(), self.pixel_height.abs());
        if (w - h).abs() > 1e-9 * w.max(h) {
            return Err(Error::invalid_parameter(
                "cell_size",
                format!("{} x {}", w, h),
                "cells must be square",
            ));
        }
        Ok(())
    }

    /// Calculate the bounding box (min_x, min_y, max_x, max_y) for a grid of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(width, height);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
