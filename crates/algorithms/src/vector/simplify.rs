//! Douglas-Peucker simplification of traced crown outlines

use geo::{LineString, MultiPolygon, Polygon, Simplify};

/// Simplify every ring of a polygon.
///
/// Rings that collapse below a valid ring (4 coordinates) are dropped for
/// holes; an exterior that collapses leaves the polygon untouched.
pub fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let exterior = polygon.exterior().simplify(&tolerance);
    if exterior.0.len() < 4 {
        return polygon.clone();
    }
    let interiors: Vec<LineString<f64>> = polygon
        .interiors()
        .iter()
        .map(|ring| ring.simplify(&tolerance))
        .filter(|ring| ring.0.len() >= 4)
        .collect();
    Polygon::new(exterior, interiors)
}

/// Simplify each part of a multipolygon
pub fn simplify_multipolygon(mp: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return mp.clone();
    }
    MultiPolygon::new(mp.0.iter().map(|p| simplify_polygon(p, tolerance)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staircase() -> Polygon<f64> {
        // Pixel staircase along the diagonal of a 4x4 block
        Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (4.0, 0.0),
                (4.0, 1.0),
                (3.0, 1.0),
                (3.0, 2.0),
                (2.0, 2.0),
                (2.0, 3.0),
                (1.0, 3.0),
                (1.0, 4.0),
                (0.0, 4.0),
                (0.0, 0.0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_staircase_smoothed() {
        let poly = staircase();
        let simplified = simplify_polygon(&poly, 0.8);
        assert!(simplified.exterior().0.len() < poly.exterior().0.len());
        assert_eq!(simplified.exterior().0.first(), simplified.exterior().0.last());
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let mp = MultiPolygon::new(vec![staircase()]);
        assert_eq!(simplify_multipolygon(&mp, 0.0), mp);
    }

    #[test]
    fn test_collapsing_hole_dropped() {
        let hole = LineString::from(vec![(1.0, 1.0), (1.2, 1.0), (1.2, 1.2), (1.0, 1.2), (1.0, 1.0)]);
        let poly = Polygon::new(staircase().exterior().clone(), vec![hole]);
        let simplified = simplify_polygon(&poly, 1.0);
        assert!(simplified.interiors().is_empty());
    }
}
