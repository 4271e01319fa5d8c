//! Crown polygon tracing
//!
//! Each labeled region is outlined along cell boundaries. Every cell side
//! that separates a region from anything else becomes a directed edge with
//! the region on its right; edges are chained into closed rings, turning
//! right first at pinch vertices so that diagonal-only contacts split into
//! separate parts. Rings are then classified as exteriors or holes by their
//! orientation.

use std::collections::{BTreeMap, HashMap};
use geo::{Area, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use tracing::debug;
use crate::treetops::Treetops;
use crate::vector::{equivalent_diameter, multipolygon_perimeter, simplify_multipolygon};
use crowntrace_core::raster::{GeoTransform, Raster};
use crowntrace_core::vector::{Feature, FeatureCollection};
use crowntrace_core::{Error, Result, CRS};

/// A traced tree crown
#[derive(Debug, Clone, PartialEq)]
pub struct CrownPolygon {
    /// Treetop id (also the raster label)
    pub id: u32,
    /// Treetop height
    pub height: f64,
    /// Area in ground units squared
    pub crown_area: f64,
    /// Diameter of the circle with the same area
    pub crown_diameter: f64,
    /// Boundary length, holes included
    pub perimeter: f64,
    /// Labeled cells in the region
    pub cell_count: usize,
    pub geometry: MultiPolygon<f64>,
}

impl CrownPolygon {
    pub fn to_feature(&self) -> Feature {
        Feature::new(self.geometry.clone())
            .with_property("treeID", self.id as i64)
            .with_property("height", self.height)
            .with_property("crownArea", self.crown_area)
            .with_property("crownDiameter", self.crown_diameter)
    }
}

/// Polygon features for a set of crowns
pub fn crowns_to_features(crowns: &[CrownPolygon], crs: Option<CRS>) -> FeatureCollection {
    crowns
        .iter()
        .map(CrownPolygon::to_feature)
        .collect::<FeatureCollection>()
        .with_crs(crs)
}

// Edge directions in index space (x = col, y = row, y grows downwards),
// listed clockwise so that `(d + 1) % 4` is a right turn.
const EAST: u8 = 0;
const SOUTH: u8 = 1;
const WEST: u8 = 2;
const NORTH: u8 = 3;

const STEP: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

type Vertex = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    dir: u8,
}

impl Edge {
    fn to(&self) -> Vertex {
        let (dx, dy) = STEP[self.dir as usize];
        (self.from.0 + dx, self.from.1 + dy)
    }
}

#[derive(Default)]
struct RegionEdges {
    edges: Vec<Edge>,
    cells: usize,
}

/// Collect boundary edges of every positive label in one raster pass
fn collect_edges(labels: &Raster<i32>) -> BTreeMap<i32, RegionEdges> {
    let (rows, cols) = labels.shape();
    let data = labels.data();
    let mut regions: BTreeMap<i32, RegionEdges> = BTreeMap::new();

    let label_at = |r: isize, c: isize| -> i32 {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            0
        } else {
            data[(r as usize, c as usize)]
        }
    };

    for row in 0..rows {
        for col in 0..cols {
            let label = data[(row, col)];
            if label <= 0 {
                continue;
            }
            let region = regions.entry(label).or_default();
            region.cells += 1;

            let (r, c) = (row as isize, col as isize);
            let (x, y) = (col as i64, row as i64);
            if label_at(r - 1, c) != label {
                region.edges.push(Edge { from: (x, y), dir: EAST });
            }
            if label_at(r, c + 1) != label {
                region.edges.push(Edge { from: (x + 1, y), dir: SOUTH });
            }
            if label_at(r + 1, c) != label {
                region.edges.push(Edge { from: (x + 1, y + 1), dir: WEST });
            }
            if label_at(r, c - 1) != label {
                region.edges.push(Edge { from: (x, y + 1), dir: NORTH });
            }
        }
    }

    regions
}

/// A closed ring in index space
struct Ring {
    coords: Vec<Vertex>,
    first_edge: Edge,
    signed_area: f64,
}

/// Chain a region's edges into closed rings.
fn trace_rings(edges: &[Edge]) -> Result<Vec<Ring>> {
    let mut outgoing: HashMap<Vertex, [Option<usize>; 4]> = HashMap::with_capacity(edges.len());
    for (idx, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_insert([None; 4])[edge.dir as usize] = Some(idx);
    }

    let next_edge = |edge: &Edge| -> Option<usize> {
        let out = outgoing.get(&edge.to())?;
        [(edge.dir + 1) % 4, edge.dir, (edge.dir + 3) % 4]
            .into_iter()
            .find_map(|d| out[d as usize])
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        let mut chain = vec![start];
        used[start] = true;
        let mut current = start;
        loop {
            let next = next_edge(&edges[current])
                .ok_or_else(|| Error::Algorithm("crown boundary does not close".into()))?;
            if next == start {
                break;
            }
            if used[next] || chain.len() > edges.len() {
                return Err(Error::Algorithm("crown boundary revisits an edge".into()));
            }
            used[next] = true;
            chain.push(next);
            current = next;
        }

        // Keep only corners: a vertex whose outgoing direction differs from
        // the incoming one.
        let n = chain.len();
        let mut coords: Vec<Vertex> = (0..n)
            .filter(|&i| edges[chain[i]].dir != edges[chain[(i + n - 1) % n]].dir)
            .map(|i| edges[chain[i]].from)
            .collect();
        if let Some(&first) = coords.first() {
            coords.push(first);
        }

        let signed_area = coords
            .windows(2)
            .map(|w| (w[0].0 * w[1].1 - w[1].0 * w[0].1) as f64)
            .sum::<f64>()
            / 2.0;

        rings.push(Ring {
            coords,
            first_edge: edges[start],
            signed_area,
        });
    }

    Ok(rings)
}

fn index_ring(ring: &Ring) -> LineString<f64> {
    ring.coords
        .iter()
        .map(|&(x, y)| Coord { x: x as f64, y: y as f64 })
        .collect()
}

fn world_ring(ring: &Ring, transform: &GeoTransform) -> LineString<f64> {
    ring.coords
        .iter()
        .map(|&(x, y)| {
            let (gx, gy) = transform.fractional_to_geo(x as f64, y as f64);
            Coord { x: gx, y: gy }
        })
        .collect()
}

/// Assemble rings into polygons: clockwise-on-screen rings (positive area
/// with y down) are exteriors, the others are holes placed in the smallest
/// exterior containing the cell just outside them.
fn assemble(rings: Vec<Ring>, transform: &GeoTransform) -> Result<MultiPolygon<f64>> {
    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.signed_area > 0.0);

    let index_exteriors: Vec<Polygon<f64>> = exteriors
        .iter()
        .map(|r| Polygon::new(index_ring(r), vec![]))
        .collect();
    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];

    for hole in &holes {
        // The cell on the left of a boundary edge is outside the region,
        // which for a hole means inside the hole.
        let edge = hole.first_edge;
        let (dx, dy) = STEP[edge.dir as usize];
        let probe = Point::new(
            edge.from.0 as f64 + 0.5 * dx as f64 + 0.5 * dy as f64,
            edge.from.1 as f64 + 0.5 * dy as f64 - 0.5 * dx as f64,
        );

        let owner = index_exteriors
            .iter()
            .enumerate()
            .filter(|(_, ext)| ext.contains(&probe))
            .min_by(|a, b| a.1.unsigned_area().total_cmp(&b.1.unsigned_area()))
            .map(|(i, _)| i)
            .ok_or_else(|| Error::Algorithm("crown hole outside every exterior ring".into()))?;

        interiors[owner].push(world_ring(hole, transform));
    }

    Ok(MultiPolygon::new(
        exteriors
            .iter()
            .zip(interiors)
            .map(|(ext, holes)| Polygon::new(world_ring(ext, transform), holes))
            .collect(),
    ))
}

/// Trace crown polygons from a label raster.
///
/// One [`CrownPolygon`] per positive label, ordered by label. Regions made
/// of several 4-connected pieces become multi-part geometries; unlabeled
/// cells enclosed by a region become holes. Without simplification the
/// crown area equals `cell_count × cell_area` exactly.
pub fn crown_polygons(
    labels: &Raster<i32>,
    treetops: &Treetops,
    simplify_tolerance: Option<f64>,
) -> Result<Vec<CrownPolygon>> {
    if let Some(tol) = simplify_tolerance
        && (!tol.is_finite() || tol < 0.0)
    {
        return Err(Error::invalid_parameter(
            "simplify_tolerance",
            tol,
            "must be a non-negative finite distance",
        ));
    }

    let transform = labels.transform();
    let regions = collect_edges(labels);
    debug!(regions = regions.len(), "tracing crown polygons");

    let mut crowns = Vec::with_capacity(regions.len());
    for (label, region) in regions {
        let id = label as u32;
        let top = treetops
            .get(id)
            .ok_or_else(|| Error::Algorithm(format!("crown label {} has no matching treetop", label)))?;

        let rings = trace_rings(&region.edges)?;
        let mut geometry = assemble(rings, transform)?;
        if let Some(tol) = simplify_tolerance {
            geometry = simplify_multipolygon(&geometry, tol);
        }

        let crown_area = geometry.unsigned_area();
        crowns.push(CrownPolygon {
            id,
            height: top.height,
            crown_area,
            crown_diameter: equivalent_diameter(crown_area),
            perimeter: multipolygon_perimeter(&geometry),
            cell_count: region.cells,
            geometry,
        });
    }

    Ok(crowns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treetops::Treetop;
    use approx::assert_relative_eq;

    fn label_raster(values: &[i32], rows: usize, cols: usize, cell: f64) -> Raster<i32> {
        let mut r = Raster::from_vec(values.to_vec(), rows, cols)
            .unwrap()
            .with_transform(GeoTransform::from_origin(100.0, 200.0, cell));
        r.set_nodata(Some(0));
        r
    }

    fn tops(ids: &[u32]) -> Treetops {
        Treetops::new(
            ids.iter()
                .map(|&id| Treetop { id, x: 0.0, y: 0.0, height: 10.0 + id as f64, win_radius: 1.0 })
                .collect(),
            None,
        )
    }

    #[test]
    fn test_square_region() {
        #[rustfmt::skip]
        let labels = label_raster(&[
            0, 0, 0, 0,
            0, 1, 1, 0,
            0, 1, 1, 0,
            0, 0, 0, 0,
        ], 4, 4, 0.5);

        let crowns = crown_polygons(&labels, &tops(&[1]), None).unwrap();
        assert_eq!(crowns.len(), 1);
        let c = &crowns[0];
        assert_eq!(c.id, 1);
        assert_eq!(c.cell_count, 4);
        assert_relative_eq!(c.height, 11.0);
        assert_relative_eq!(c.crown_area, 1.0, epsilon = 1e-10);
        assert_relative_eq!(c.perimeter, 4.0, epsilon = 1e-10);
        assert_relative_eq!(c.crown_diameter, 2.0 / std::f64::consts::PI.sqrt(), epsilon = 1e-10);

        let poly = &c.geometry.0[0];
        // Collinear vertices removed: 4 corners + closing point
        assert_eq!(poly.exterior().0.len(), 5);
        assert!(poly.exterior().0.contains(&Coord { x: 100.5, y: 199.5 }));
        assert!(poly.exterior().0.contains(&Coord { x: 101.5, y: 198.5 }));
    }

    #[test]
    fn test_area_matches_cell_count() {
        #[rustfmt::skip]
        let labels = label_raster(&[
            1, 1, 2, 2, 2,
            1, 2, 2, 0, 2,
            1, 1, 2, 2, 2,
        ], 3, 5, 2.0);

        let crowns = crown_polygons(&labels, &tops(&[1, 2]), None).unwrap();
        for c in &crowns {
            assert_relative_eq!(c.crown_area, c.cell_count as f64 * 4.0, epsilon = 1e-9);
        }
        assert_eq!(crowns[0].cell_count, 5);
        assert_eq!(crowns[1].cell_count, 9);
    }

    #[test]
    fn test_enclosed_background_becomes_hole() {
        #[rustfmt::skip]
        let labels = label_raster(&[
            1, 1, 1,
            1, 0, 1,
            1, 1, 1,
        ], 3, 3, 1.0);

        let crowns = crown_polygons(&labels, &tops(&[1]), None).unwrap();
        let geom = &crowns[0].geometry;
        assert_eq!(geom.0.len(), 1);
        assert_eq!(geom.0[0].interiors().len(), 1);
        assert_relative_eq!(crowns[0].crown_area, 8.0, epsilon = 1e-10);
        assert_relative_eq!(crowns[0].perimeter, 16.0, epsilon = 1e-10);
    }

    #[test]
    fn test_diagonal_contact_splits_parts() {
        #[rustfmt::skip]
        let labels = label_raster(&[
            1, 0,
            0, 1,
        ], 2, 2, 1.0);
        let crowns = crown_polygons(&labels, &tops(&[1]), None).unwrap();
        assert_eq!(crowns[0].geometry.0.len(), 2);
        assert_relative_eq!(crowns[0].crown_area, 2.0, epsilon = 1e-10);

        #[rustfmt::skip]
        let anti = label_raster(&[
            0, 1,
            1, 0,
        ], 2, 2, 1.0);
        let crowns = crown_polygons(&anti, &tops(&[1]), None).unwrap();
        assert_eq!(crowns[0].geometry.0.len(), 2);
    }

    #[test]
    fn test_simplification_keeps_outline_close() {
        let mut values = vec![0; 64];
        for r in 0..8 {
            for c in 0..8 {
                if (r as f64 - 3.5).powi(2) + (c as f64 - 3.5).powi(2) <= 12.5 {
                    values[r * 8 + c] = 1;
                }
            }
        }
        let labels = label_raster(&values, 8, 8, 1.0);
        let exact = crown_polygons(&labels, &tops(&[1]), None).unwrap();
        let smooth = crown_polygons(&labels, &tops(&[1]), Some(0.6)).unwrap();

        assert!(smooth[0].geometry.0[0].exterior().0.len() < exact[0].geometry.0[0].exterior().0.len());
        assert!((smooth[0].crown_area - exact[0].crown_area).abs() / exact[0].crown_area < 0.2);
        assert_eq!(smooth[0].cell_count, exact[0].cell_count);
    }

    #[test]
    fn test_invalid_tolerance_and_missing_treetop() {
        let labels = label_raster(&[1, 2], 1, 2, 1.0);
        assert!(matches!(
            crown_polygons(&labels, &tops(&[1, 2]), Some(-1.0)),
            Err(Error::InvalidParameter { name: "simplify_tolerance", .. })
        ));
        assert!(matches!(
            crown_polygons(&labels, &tops(&[1]), None),
            Err(Error::Algorithm(_))
        ));
    }

    #[test]
    fn test_features() {
        let labels = label_raster(&[1, 1], 1, 2, 1.0);
        let crowns = crown_polygons(&labels, &tops(&[1]), None).unwrap();
        let fc = crowns_to_features(&crowns, Some(CRS::from_epsg(32633)));
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].get_f64("crownArea"), Some(2.0));
        assert_eq!(fc.features[0].get_f64("treeID"), Some(1.0));
    }
}
