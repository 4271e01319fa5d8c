//! Marker-controlled watershed (MCWS) crown segmentation
//!
//! The CHM is flooded from the treetops downwards. All basins share one
//! priority queue ordered by height, so the highest unlabeled boundary cell
//! anywhere is always claimed next and neighbouring crowns meet along the
//! height divide between them.
//!
//! Reference:
//! Meyer, F., & Beucher, S. (1990). Morphological segmentation.
//! *Journal of Visual Communication and Image Representation*, 1(1), 21–46.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::segmentation::polygonize::{crown_polygons, CrownPolygon};
use crate::treetops::Treetops;
use crowntrace_core::crs::ensure_compatible;
use crowntrace_core::raster::{Connectivity, Raster};
use crowntrace_core::{Algorithm, Error, Result};

/// Output representation of the crowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrownFormat {
    /// Labeled raster only
    #[default]
    Raster,
    /// Labeled raster plus traced crown polygons
    Polygons,
}

/// Parameters for marker-controlled watershed segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McwsParams {
    /// Cells lower than this stay background
    pub min_height: f64,
    /// Neighbourhood used when growing crowns
    pub connectivity: Connectivity,
    /// Whether to trace crown polygons
    pub format: CrownFormat,
    /// Douglas-Peucker tolerance (ground units) applied to traced polygons
    pub simplify_tolerance: Option<f64>,
}

impl Default for McwsParams {
    fn default() -> Self {
        Self {
            min_height: 1.0,
            connectivity: Connectivity::Eight,
            format: CrownFormat::Raster,
            simplify_tolerance: None,
        }
    }
}

/// Segmentation result
#[derive(Debug, Clone)]
pub struct Crowns {
    /// Crown labels: treetop id per cell, 0 = background (no-data)
    pub labels: Raster<i32>,
    /// Traced crowns, present in [`CrownFormat::Polygons`] mode
    pub polygons: Option<Vec<CrownPolygon>>,
}

impl Crowns {
    /// Number of cells per crown label
    pub fn region_sizes(&self) -> BTreeMap<i32, usize> {
        let mut sizes = BTreeMap::new();
        for &label in self.labels.data().iter().filter(|l| **l > 0) {
            *sizes.entry(label).or_insert(0) += 1;
        }
        sizes
    }

    /// Number of labeled cells
    pub fn labeled_cells(&self) -> usize {
        self.labels.data().iter().filter(|l| **l > 0).count()
    }
}

/// Marker-controlled watershed algorithm
#[derive(Debug, Clone, Default)]
pub struct MarkerWatershed;

impl Algorithm for MarkerWatershed {
    type Input = (Raster<f64>, Treetops);
    type Output = Crowns;
    type Params = McwsParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MarkerWatershed"
    }

    fn description(&self) -> &'static str {
        "Segment tree crowns by flooding the canopy from treetop markers"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (chm, treetops) = input;
        mcws(&chm, &treetops, params)
    }
}

/// A boundary cell waiting in the flood queue, tagged with its basin.
///
/// Higher cells pop first; equal heights pop in raster scan order, then in
/// insertion order so a seed always claims its own cell.
#[derive(Debug, Clone, Copy)]
struct FloodCell {
    height: f64,
    index: usize,
    seq: u64,
    label: i32,
}

impl PartialEq for FloodCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodCell {}

impl PartialOrd for FloodCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodCell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .total_cmp(&other.height)
            .then_with(|| other.index.cmp(&self.index))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Segment crowns from a CHM and its treetops.
///
/// # Algorithm
/// 1. Every treetop at or above `min_height` seeds a basin labeled with its id.
/// 2. The highest queued cell is popped; if still unlabeled it joins the
///    basin it was queued for, and its unlabeled valid neighbours at or above
///    `min_height` are queued for that basin.
/// 3. Repeat until the queue is empty. Cells no marker can reach stay 0.
///
/// # Errors
/// `CrsMismatch` / `ExtentMismatch` when the treetops do not belong to the CHM.
pub fn mcws(chm: &Raster<f64>, treetops: &Treetops, params: McwsParams) -> Result<Crowns> {
    let labels = segment_crowns(chm, treetops, params.min_height, params.connectivity)?;

    let polygons = match params.format {
        CrownFormat::Raster => None,
        CrownFormat::Polygons => Some(crown_polygons(&labels, treetops, params.simplify_tolerance)?),
    };

    Ok(Crowns { labels, polygons })
}

/// Raster part of [`mcws`]: crown labels only.
pub fn segment_crowns(
    chm: &Raster<f64>,
    treetops: &Treetops,
    min_height: f64,
    connectivity: Connectivity,
) -> Result<Raster<i32>> {
    chm.validate_grid()?;
    if !min_height.is_finite() {
        return Err(Error::invalid_parameter("min_height", min_height, "must be finite"));
    }
    ensure_compatible(chm.crs(), treetops.crs())?;

    let (rows, cols) = chm.shape();
    debug!(rows, cols, min_height, markers = treetops.len(), ?connectivity, "marker-controlled watershed");

    let mut labels = Array2::<i32>::zeros((rows, cols));
    let mut heap = BinaryHeap::with_capacity(treetops.len() * 8);
    let mut seq: u64 = 0;
    let mut seeded = Array2::<bool>::from_elem((rows, cols), false);

    for top in treetops.iter() {
        let (row, col) = chm.cell_at(top.x, top.y).ok_or_else(|| {
            let (min_x, min_y, max_x, max_y) = chm.bounds();
            Error::ExtentMismatch(format!(
                "treetop {} at ({}, {}) lies outside the grid [{}, {}, {}, {}]",
                top.id, top.x, top.y, min_x, min_y, max_x, max_y
            ))
        })?;
        let label = i32::try_from(top.id)
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| Error::invalid_parameter("treetop id", top.id, "must be in 1..=i32::MAX"))?;

        let Some(height) = chm.valid_value(row, col).filter(|h| *h >= min_height) else {
            warn!(id = top.id, row, col, "treetop below min_height or on no-data, skipped");
            continue;
        };
        if seeded[(row, col)] {
            warn!(id = top.id, row, col, "treetop shares a cell with an earlier marker, skipped");
            continue;
        }
        seeded[(row, col)] = true;

        heap.push(FloodCell {
            height,
            index: row * cols + col,
            seq,
            label,
        });
        seq += 1;
    }

    let mut labeled: usize = 0;
    while let Some(cell) = heap.pop() {
        let (row, col) = (cell.index / cols, cell.index % cols);
        if labels[(row, col)] != 0 {
            continue;
        }
        labels[(row, col)] = cell.label;
        labeled += 1;

        for &(dr, dc) in connectivity.offsets() {
            let nr = row as isize + dr;
            let nc = col as isize + dc;

            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }

            let (nr, nc) = (nr as usize, nc as usize);
            if labels[(nr, nc)] != 0 {
                continue;
            }

            let Some(height) = chm.valid_value(nr, nc) else {
                continue;
            };
            if height < min_height {
                continue;
            }

            heap.push(FloodCell {
                height,
                index: nr * cols + nc,
                seq,
                label: cell.label,
            });
            seq += 1;
        }
    }

    info!(labeled_cells = labeled, "marker-controlled watershed finished");

    let mut output = chm.with_same_meta::<i32>(rows, cols);
    output.set_nodata(Some(0));
    *output.data_mut() = labels;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treetops::Treetop;
    use crowntrace_core::{GeoTransform, CRS};

    fn chm_from(values: &[f64], rows: usize, cols: usize) -> Raster<f64> {
        Raster::from_vec(values.to_vec(), rows, cols)
            .unwrap()
            .with_transform(GeoTransform::from_origin(0.0, rows as f64, 1.0))
    }

    fn top_at(chm: &Raster<f64>, id: u32, row: usize, col: usize) -> Treetop {
        let (x, y) = chm.pixel_to_geo(col, row);
        Treetop {
            id,
            x,
            y,
            height: chm.get(row, col).unwrap(),
            win_radius: 1.0,
        }
    }

    #[test]
    fn test_two_crowns_split_at_divide() {
        #[rustfmt::skip]
        let chm = chm_from(&[
            3.0, 6.0, 9.0, 6.0, 4.0, 7.0, 10.0, 7.0, 3.0,
        ], 1, 9);
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 2), top_at(&chm, 2, 0, 6)], None);

        let labels = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        let row: Vec<i32> = labels.data().row(0).to_vec();
        assert_eq!(row, vec![1, 1, 1, 1, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_background_below_floor_and_unmarked_component() {
        #[rustfmt::skip]
        let chm = chm_from(&[
            5.0, 6.0, 0.5, 8.0, 7.0,
            4.0, 5.0, 0.5, 7.0, 6.0,
        ], 2, 5);
        // Only the left component has a marker.
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 1)], None);

        let labels = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        for row in 0..2 {
            assert_eq!(labels.get(row, 0).unwrap(), 1);
            assert_eq!(labels.get(row, 1).unwrap(), 1);
            assert_eq!(labels.get(row, 2).unwrap(), 0);
            assert_eq!(labels.get(row, 3).unwrap(), 0);
            assert_eq!(labels.get(row, 4).unwrap(), 0);
        }
        assert_eq!(labels.nodata(), Some(0));
    }

    #[test]
    fn test_connectivity_four_blocks_diagonal_growth() {
        #[rustfmt::skip]
        let chm = chm_from(&[
            9.0, 0.0,
            0.0, 5.0,
        ], 2, 2);
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 0)], None);

        let four = segment_crowns(&chm, &tops, 1.0, Connectivity::Four).unwrap();
        assert_eq!(four.get(1, 1).unwrap(), 0);
        let eight = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        assert_eq!(eight.get(1, 1).unwrap(), 1);
    }

    #[test]
    fn test_plateau_tie_broken_by_scan_order() {
        // Two markers flank a flat saddle cell; the basin whose queued entry
        // for that cell pops first under (height, index, insertion) wins.
        let chm = chm_from(&[9.0, 4.0, 4.0, 4.0, 9.0], 1, 5);
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 0), top_at(&chm, 2, 0, 4)], None);

        let a = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        let b = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(a.get(0, 1).unwrap(), 1);
        assert_eq!(a.get(0, 3).unwrap(), 2);
        assert!(a.get(0, 2).unwrap() > 0);
    }

    #[test]
    fn test_marker_below_floor_skipped() {
        let chm = chm_from(&[0.5, 0.4, 0.3], 1, 3);
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 0)], None);
        let labels = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap();
        assert!(labels.data().iter().all(|l| *l == 0));
    }

    #[test]
    fn test_treetop_outside_grid_rejected() {
        let chm = chm_from(&[5.0; 9], 3, 3);
        let tops = Treetops::new(
            vec![Treetop { id: 1, x: 10.0, y: 10.0, height: 5.0, win_radius: 1.0 }],
            None,
        );
        let err = segment_crowns(&chm, &tops, 1.0, Connectivity::Eight).unwrap_err();
        assert!(matches!(err, Error::ExtentMismatch(_)));
        assert!(err.is_input_mismatch());
    }

    #[test]
    fn test_crs_mismatch_rejected() {
        let chm = chm_from(&[5.0; 9], 3, 3).with_crs(CRS::from_epsg(2154));
        let tops = Treetops::new(vec![top_at(&chm, 1, 1, 1)], Some(CRS::from_epsg(4326)));
        assert!(matches!(
            segment_crowns(&chm, &tops, 1.0, Connectivity::Eight),
            Err(Error::CrsMismatch(_, _))
        ));
    }

    #[test]
    fn test_polygon_mode_attaches_polygons() {
        let chm = chm_from(&[3.0, 6.0, 9.0, 6.0, 4.0, 7.0, 10.0, 7.0, 3.0], 1, 9);
        let tops = Treetops::new(vec![top_at(&chm, 1, 0, 2), top_at(&chm, 2, 0, 6)], None);

        let raster_only = mcws(&chm, &tops, McwsParams::default()).unwrap();
        assert!(raster_only.polygons.is_none());

        let crowns = mcws(
            &chm,
            &tops,
            McwsParams { format: CrownFormat::Polygons, ..Default::default() },
        )
        .unwrap();
        let polys = crowns.polygons.as_ref().unwrap();
        assert_eq!(polys.len(), 2);
        assert_eq!(crowns.region_sizes().get(&1), Some(&4));
        assert_eq!(crowns.region_sizes().get(&2), Some(&5));
        assert_eq!(crowns.labeled_cells(), 9);
    }

    #[test]
    fn test_flood_cell_ordering() {
        let high = FloodCell { height: 5.0, index: 9, seq: 9, label: 1 };
        let low = FloodCell { height: 4.0, index: 0, seq: 0, label: 2 };
        assert!(high > low);

        let early = FloodCell { height: 4.0, index: 1, seq: 5, label: 1 };
        let late = FloodCell { height: 4.0, index: 2, seq: 0, label: 2 };
        assert!(early > late);

        let first = FloodCell { height: 4.0, index: 1, seq: 0, label: 1 };
        let second = FloodCell { height: 4.0, index: 1, seq: 1, label: 2 };
        assert!(first > second);
    }
}
