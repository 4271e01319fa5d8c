//! Zones for summaries: global, polygons, or a regular grid

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Coord, Geometry, Line, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use crate::vector::BoundingBox;
use crowntrace_core::raster::{GeoTransform, Raster, RasterElement};
use crowntrace_core::vector::FeatureCollection;
use crowntrace_core::{Error, Result, CRS};

/// Largest number of cells a summary grid may have
pub const MAX_GRID_CELLS: usize = 100_000_000;

/// Where summaries are computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSpec {
    /// One record over all inputs
    #[default]
    Global,
    /// One record per polygon feature; zone attributes are carried over
    Polygons(FeatureCollection),
    /// Grid of square cells of this size tiling the extent
    GridCellSize(f64),
    /// Grid aligned to an existing raster definition
    GridTemplate(GridDefinition),
}

/// How an input region is matched to a zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionAssignment {
    /// By the centroid of the region (points use themselves)
    #[default]
    Centroid,
    /// By the share of the region's area inside the zone
    Overlap { min_fraction: f64 },
}

impl RegionAssignment {
    pub(crate) fn validate(&self) -> Result<()> {
        if let RegionAssignment::Overlap { min_fraction } = *self
            && !(min_fraction > 0.0 && min_fraction <= 1.0)
        {
            return Err(Error::invalid_parameter(
                "min_fraction",
                min_fraction,
                "overlap fraction must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Georeferenced grid shape without data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDefinition {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: Option<CRS>,
}

impl GridDefinition {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self {
            transform,
            rows,
            cols,
            crs: None,
        }
    }

    pub fn with_crs(mut self, crs: Option<CRS>) -> Self {
        self.crs = crs;
        self
    }

    /// Grid of an existing raster
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            transform: *raster.transform(),
            rows: raster.rows(),
            cols: raster.cols(),
            crs: raster.crs().cloned(),
        }
    }

    /// Tile an extent from its upper-left corner with square cells.
    ///
    /// The grid has `ceil(width / size)` columns and `ceil(height / size)`
    /// rows, at least one of each, so it may extend past the right and
    /// bottom edges of the extent.
    pub fn from_extent(extent: &BoundingBox, cell_size: f64, crs: Option<CRS>) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(Error::invalid_parameter("cell_size", cell_size, "cell size must be > 0"));
        }
        if !extent.is_finite() || extent.width() < 0.0 || extent.height() < 0.0 {
            return Err(Error::invalid_parameter(
                "extent",
                format!("{:?}", extent),
                "extent must be finite with min <= max",
            ));
        }

        let count = |span: f64| (span / cell_size - 1e-9).ceil().max(1.0);
        let (rows, cols) = (count(extent.height()), count(extent.width()));
        if rows * cols > MAX_GRID_CELLS as f64 {
            return Err(Error::invalid_parameter(
                "cell_size",
                cell_size,
                format!("tiling the extent needs {} x {} cells, more than {}", rows, cols, MAX_GRID_CELLS),
            ));
        }

        let transform = GeoTransform::from_origin(extent.min_x, extent.max_y, cell_size);
        let grid = Self::new(transform, rows as usize, cols as usize).with_crs(crs);
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidDimensions {
                width: self.cols,
                height: self.rows,
            });
        }
        if self.rows.checked_mul(self.cols).is_none_or(|n| n > MAX_GRID_CELLS) {
            return Err(Error::invalid_parameter(
                "grid",
                format!("{} x {}", self.rows, self.cols),
                format!("more than {} cells", MAX_GRID_CELLS),
            ));
        }
        self.transform.validate()
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_bounds(self.transform.bounds(self.cols, self.rows))
    }

    /// Extent of one cell
    pub fn cell_bounds(&self, row: usize, col: usize) -> BoundingBox {
        let (x0, y0) = self.transform.pixel_to_geo_corner(col, row);
        let (x1, y1) = self.transform.pixel_to_geo_corner(col + 1, row + 1);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Cell containing a location.
    ///
    /// Cells are closed on their upper-left edges; locations on the far
    /// right or bottom edge of the grid fall in the last column or row.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() {
            return None;
        }
        if col < 0.0 || row < 0.0 || col > self.cols as f64 || row > self.rows as f64 {
            return None;
        }
        let col = (col.floor() as usize).min(self.cols - 1);
        let row = (row.floor() as usize).min(self.rows - 1);
        Some((row, col))
    }

    /// Empty raster on this grid, NaN-filled and NaN no-data
    pub fn empty_layer(&self) -> Raster<f64> {
        let mut raster = Raster::filled(self.rows, self.cols, f64::NAN)
            .with_transform(self.transform)
            .with_nodata(f64::NAN);
        raster.set_crs(self.crs.clone());
        raster
    }
}

fn unsupported(reason: impl Into<String>) -> Error {
    Error::UnsupportedGeometry(reason.into())
}

fn ring_segments(ring: &geo::LineString<f64>, which: &str) -> Result<Vec<Line<f64>>> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return Err(unsupported(format!("{} ring has {} coordinates, need at least 4", which, coords.len())));
    }
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(unsupported(format!("{} ring has non-finite coordinates", which)));
    }
    if coords.first() != coords.last() {
        return Err(unsupported(format!("{} ring is not closed", which)));
    }

    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if distinct.last() != Some(c) {
            distinct.push(*c);
        }
    }
    let segments: Vec<Line<f64>> = distinct.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    if segments.len() < 3 {
        return Err(unsupported(format!("{} ring is degenerate", which)));
    }
    Ok(segments)
}

fn check_polygon(polygon: &Polygon<f64>) -> Result<()> {
    let mut rings: Vec<Vec<Line<f64>>> = vec![ring_segments(polygon.exterior(), "exterior")?];
    for interior in polygon.interiors() {
        rings.push(ring_segments(interior, "interior")?);
    }
    if polygon.unsigned_area() <= 0.0 {
        return Err(unsupported("polygon has zero area"));
    }

    for (ri, ring) in rings.iter().enumerate() {
        let n = ring.len();
        for (i, a) in ring.iter().enumerate() {
            for (j, b) in ring.iter().enumerate().skip(i + 1) {
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                match line_intersection(*a, *b) {
                    None => {}
                    // Consecutive segments share their common vertex only.
                    Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                    Some(_) => return Err(unsupported("ring self-intersects")),
                }
            }
            // Rings may touch at isolated points but not cross or share edges.
            for other in &rings[ri + 1..] {
                let crosses = other.iter().any(|b| {
                    matches!(
                        line_intersection(*a, *b),
                        Some(LineIntersection::Collinear { .. })
                            | Some(LineIntersection::SinglePoint { is_proper: true, .. })
                    )
                });
                if crosses {
                    return Err(unsupported("rings of one polygon intersect"));
                }
            }
        }
    }
    Ok(())
}

/// Check a zone geometry and normalize it to a multipolygon.
///
/// Rejects non-polygonal geometries, rings with fewer than 4 coordinates,
/// unclosed rings, non-finite coordinates, zero area and self-intersections.
pub fn validate_zone(geometry: Option<&Geometry<f64>>) -> Result<MultiPolygon<f64>> {
    let mp = match geometry {
        Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p.clone()]),
        Some(Geometry::MultiPolygon(mp)) => mp.clone(),
        Some(Geometry::Rect(r)) => MultiPolygon::new(vec![r.to_polygon()]),
        Some(other) => {
            return Err(unsupported(format!(
                "zone must be polygonal, got {}",
                geometry_kind(other)
            )));
        }
        None => return Err(unsupported("zone has no geometry")),
    };
    if mp.0.is_empty() {
        return Err(unsupported("zone multipolygon is empty"));
    }
    for polygon in &mp.0 {
        check_polygon(polygon)?;
    }
    Ok(mp)
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
