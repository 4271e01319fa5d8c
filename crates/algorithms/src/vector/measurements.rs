//! Crown measurements: area, perimeter, equivalent diameter

use geo::{Area, Euclidean, Geometry, Length, MultiPolygon, Polygon};

/// Unsigned area of a polygonal geometry, in CRS units squared.
///
/// Non-polygonal geometries have no area.
pub fn area(geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Polygon(p) => p.unsigned_area(),
        Geometry::MultiPolygon(mp) => mp.unsigned_area(),
        Geometry::Rect(r) => r.unsigned_area(),
        _ => 0.0,
    }
}

fn polygon_perimeter(p: &Polygon<f64>) -> f64 {
    let exterior = p.exterior().length::<Euclidean>();
    let interiors: f64 = p.interiors().iter().map(|r| r.length::<Euclidean>()).sum();
    exterior + interiors
}

/// Total boundary length of a polygonal geometry, holes included
pub fn perimeter(geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Polygon(p) => polygon_perimeter(p),
        Geometry::MultiPolygon(mp) => multipolygon_perimeter(mp),
        _ => 0.0,
    }
}

pub fn multipolygon_perimeter(mp: &MultiPolygon<f64>) -> f64 {
    mp.0.iter().map(polygon_perimeter).sum()
}

/// Diameter of the circle with the given area: `2·sqrt(A/π)`
pub fn equivalent_diameter(area: f64) -> f64 {
    if area <= 0.0 {
        return 0.0;
    }
    2.0 * (area / std::f64::consts::PI).sqrt()
}
